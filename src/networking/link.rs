use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One direction of an in-process network: datagrams arrive after a fixed
/// latency plus seeded random jitter, never out of order and never lost.
#[derive(Debug)]
pub struct SimulatedLink {
    latency: f64,
    jitter: f64,
    rng: StdRng,
    in_flight: VecDeque<(f64, Vec<u8>)>,
    last_delivery: f64,
    bytes_sent: u64,
}

impl SimulatedLink {
    pub fn new(latency: f64, jitter: f64, seed: u64) -> Self {
        Self {
            latency: latency.max(0.0),
            jitter: jitter.max(0.0),
            rng: StdRng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            last_delivery: 0.0,
            bytes_sent: 0,
        }
    }

    pub fn send(&mut self, now: f64, payload: Vec<u8>) {
        let jitter = if self.jitter > 0.0 {
            self.rng.random_range(0.0..self.jitter)
        } else {
            0.0
        };
        // Ordered: a datagram never overtakes the one sent before it
        let deliver_at = (now + self.latency + jitter).max(self.last_delivery);
        self.last_delivery = deliver_at;
        self.bytes_sent += payload.len() as u64;
        self.in_flight.push_back((deliver_at, payload));
    }

    /// Every datagram due by `now`, in send order.
    pub fn receive(&mut self, now: f64) -> Vec<Vec<u8>> {
        let mut delivered = Vec::new();
        while self.in_flight.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, payload)) = self.in_flight.pop_front() {
                delivered.push(payload);
            }
        }
        delivered
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_arrives_before_latency() {
        let mut link = SimulatedLink::new(0.05, 0.0, 1);
        link.send(0.0, b"a".to_vec());
        assert!(link.receive(0.04).is_empty());
        assert_eq!(link.receive(0.05), vec![b"a".to_vec()]);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_jitter_never_reorders() {
        let mut link = SimulatedLink::new(0.03, 0.05, 99);
        for i in 0..50u8 {
            link.send(i as f64 * 0.01, vec![i]);
        }
        let delivered = link.receive(10.0);
        let order: Vec<u8> = delivered.into_iter().map(|payload| payload[0]).collect();
        assert_eq!(order, (0..50).collect::<Vec<u8>>());
        assert_eq!(link.bytes_sent(), 50);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let mut a = SimulatedLink::new(0.03, 0.05, 5);
        let mut b = SimulatedLink::new(0.03, 0.05, 5);
        for i in 0..20u8 {
            a.send(i as f64 * 0.016, vec![i]);
            b.send(i as f64 * 0.016, vec![i]);
        }
        for tick in 0..20 {
            let now = tick as f64 * 0.016;
            assert_eq!(a.receive(now), b.receive(now));
        }
    }
}
