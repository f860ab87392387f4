//! In-memory sinks for the two stages of the pipeline: decoded packets
//! waiting to be time sorted, and built physics events.

use super::data_packets::DataPacket;
use super::event::PhysicsEvent;

/// Append-only store of decoded packets in file order
#[derive(Debug, Default)]
pub struct PacketStore {
    packets: Vec<DataPacket>,
}

impl PacketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: DataPacket) {
        self.packets.push(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DataPacket> {
        self.packets.get(index)
    }

    /// Indices of the packets in ascending time order. The sort is
    /// stable, so packets with equal times keep their file order.
    pub fn build_time_index(&self) -> Vec<usize> {
        let mut index: Vec<usize> = (0..self.packets.len()).collect();
        index.sort_by(|&a, &b| {
            self.packets[a]
                .time()
                .partial_cmp(&self.packets[b].time())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        index
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataPacket> {
        self.packets.iter()
    }
}

/// Append-only store of built physics events
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<PhysicsEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PhysicsEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PhysicsEvent> {
        self.events.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PhysicsEvent> {
        self.events.iter()
    }
}
