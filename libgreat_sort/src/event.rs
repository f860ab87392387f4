//! Physics events assembled by the event builder.

/// Detector families with a gamma-like response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GammaFamily {
    CeBr3,
    HpGe,
}

/// One reconstructed sub-event inside a build window
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvt {
    Tac {
        id: i16,
        tac_time: f32,
        time: f64,
    },
    Gamma {
        family: GammaFamily,
        id: i16,
        /// Representative segment for HPGe, 0 (core) for CeBr3
        segment: i16,
        energy: f32,
        time: f64,
    },
}

impl DetectorEvt {
    pub fn time(&self) -> f64 {
        match self {
            DetectorEvt::Tac { time, .. } => *time,
            DetectorEvt::Gamma { time, .. } => *time,
        }
    }
}

/// All sub-events found within one build window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicsEvent {
    pub evts: Vec<DetectorEvt>,
}

impl PhysicsEvent {
    pub fn add_evt(&mut self, evt: DetectorEvt) {
        self.evts.push(evt);
    }

    pub fn is_empty(&self) -> bool {
        self.evts.is_empty()
    }

    pub fn tac_multiplicity(&self) -> usize {
        self.evts
            .iter()
            .filter(|e| matches!(e, DetectorEvt::Tac { .. }))
            .count()
    }

    pub fn gamma_multiplicity(&self, family: GammaFamily) -> usize {
        self.evts
            .iter()
            .filter(|e| matches!(e, DetectorEvt::Gamma { family: f, .. } if *f == family))
            .count()
    }
}
