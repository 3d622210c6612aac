//! Reassembly of configuration reads.
//!
//! The dongle streams a configuration buffer as numbered 11-byte parcels.
//! Parcels may arrive in any order and may be retransmitted; the buffer is
//! complete once every sequence number needed to cover its length is present.
//!
//! A reset while a finished buffer is still waiting to be reported keeps a
//! copy of it, so a pipelined re-read never swallows the earlier result.

use std::collections::BTreeMap;

use crate::protocol::constants::PARCEL_PAYLOAD_LEN;

/// Undelivered completions kept across resets.
const RETIRED_LIMIT: usize = 4;

/// Accumulates parcels for one logical configuration channel.
#[derive(Debug)]
pub struct ConfigReader {
    length: usize,
    parcels: BTreeMap<u8, [u8; PARCEL_PAYLOAD_LEN]>,
    finished: bool,
    /// The finished buffer was handed out by [`ConfigReader::take_completed`].
    delivered: bool,
    /// Bumped by every reset.
    generation: u64,
    /// Finished but undelivered buffers of earlier generations.
    retired: Vec<(u64, Vec<u8>)>,
}

impl ConfigReader {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            parcels: BTreeMap::new(),
            finished: false,
            delivered: false,
            generation: 0,
            retired: Vec::new(),
        }
    }

    /// Target buffer length.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Parcels needed to cover the target length.
    pub fn required_parcels(&self) -> usize {
        self.length.div_ceil(PARCEL_PAYLOAD_LEN)
    }

    /// Store a parcel, replacing any earlier copy with the same `seq`.
    ///
    /// Returns `true` only for the parcel that completes the buffer.
    pub fn got_parcel(&mut self, seq: u8, payload: [u8; PARCEL_PAYLOAD_LEN]) -> bool {
        self.parcels.insert(seq, payload);
        if self.finished {
            return false;
        }
        let required = self.required_parcels();
        self.finished = (0..required)
            .all(|s| u8::try_from(s).is_ok_and(|s| self.parcels.contains_key(&s)));
        self.finished
    }

    /// Identifies the read in progress; changes on every reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reassembled buffer, or `None` while parcels are missing.
    pub fn data(&self) -> Option<Vec<u8>> {
        if !self.finished {
            return None;
        }
        let mut data: Vec<u8> = self.parcels.values().flatten().copied().collect();
        data.truncate(self.length);
        Some(data)
    }

    /// Hand out the finished buffer of `generation` once.
    ///
    /// Works for the current generation and for a finished one that a reset
    /// retired before it was delivered.
    pub fn take_completed(&mut self, generation: u64) -> Option<Vec<u8>> {
        if generation == self.generation {
            if self.delivered {
                return None;
            }
            let data = self.data()?;
            self.delivered = true;
            return Some(data);
        }
        let pos = self.retired.iter().position(|(g, _)| *g == generation)?;
        Some(self.retired.remove(pos).1)
    }

    /// Forget every parcel. Call before issuing a new read on this channel.
    ///
    /// Returns the finished buffer if it had not been delivered yet; a copy
    /// stays available through [`ConfigReader::take_completed`].
    pub fn reset(&mut self) -> Option<Vec<u8>> {
        let undelivered = self.data().filter(|_| !self.delivered);
        if let Some(data) = &undelivered {
            if self.retired.len() == RETIRED_LIMIT {
                self.retired.remove(0);
            }
            self.retired.push((self.generation, data.clone()));
        }
        self.parcels.clear();
        self.finished = false;
        self.delivered = false;
        self.generation = self.generation.wrapping_add(1);
        undelivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{CONFIG_LEN, LED_CONFIG_LEN};

    fn source(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    fn parcels(data: &[u8]) -> Vec<(u8, [u8; PARCEL_PAYLOAD_LEN])> {
        data.chunks(PARCEL_PAYLOAD_LEN)
            .enumerate()
            .map(|(seq, chunk)| {
                let mut payload = [0u8; PARCEL_PAYLOAD_LEN];
                payload[..chunk.len()].copy_from_slice(chunk);
                (seq as u8, payload)
            })
            .collect()
    }

    #[test]
    fn test_in_order_completion() {
        let data = source(CONFIG_LEN);
        let mut reader = ConfigReader::new(CONFIG_LEN);
        assert_eq!(reader.required_parcels(), 5);

        let all = parcels(&data);
        for (i, (seq, payload)) in all.iter().enumerate() {
            let completed = reader.got_parcel(*seq, *payload);
            assert_eq!(completed, i == all.len() - 1);
        }
        assert!(reader.is_finished());
        assert_eq!(reader.data(), Some(data));
    }

    #[test]
    fn test_any_order_yields_same_data() {
        let data = source(LED_CONFIG_LEN);
        let all = parcels(&data);
        let orders: [&[usize]; 4] = [
            &[4, 3, 2, 1, 0],
            &[2, 0, 4, 1, 3],
            &[1, 1, 0, 3, 4, 2],
            &[0, 2, 4, 3, 3, 1],
        ];
        for order in orders {
            let mut reader = ConfigReader::new(LED_CONFIG_LEN);
            for &i in order {
                reader.got_parcel(all[i].0, all[i].1);
            }
            assert!(reader.is_finished(), "order {order:?}");
            assert_eq!(reader.data().as_deref(), Some(data.as_slice()));
        }
    }

    #[test]
    fn test_missing_parcel_is_not_finished() {
        let all = parcels(&source(CONFIG_LEN));
        let mut reader = ConfigReader::new(CONFIG_LEN);
        for (seq, payload) in all.iter().filter(|(seq, _)| *seq != 2) {
            reader.got_parcel(*seq, *payload);
        }
        assert!(!reader.is_finished());
        assert_eq!(reader.data(), None);
    }

    #[test]
    fn test_duplicate_overwrites() {
        let data = source(CONFIG_LEN);
        let all = parcels(&data);
        let mut reader = ConfigReader::new(CONFIG_LEN);
        reader.got_parcel(0, [0xEE; PARCEL_PAYLOAD_LEN]);
        for (seq, payload) in &all {
            reader.got_parcel(*seq, *payload);
        }
        assert_eq!(reader.data(), Some(data));
    }

    #[test]
    fn test_reset_then_reread() {
        let data = source(CONFIG_LEN);
        let all = parcels(&data);
        let mut reader = ConfigReader::new(CONFIG_LEN);
        for (seq, payload) in &all {
            reader.got_parcel(*seq, *payload);
        }
        assert!(reader.is_finished());

        let before = reader.generation();
        assert_eq!(reader.take_completed(before), Some(data.clone()));
        assert_eq!(reader.reset(), None);
        assert_ne!(reader.generation(), before);
        assert!(!reader.is_finished());
        assert_eq!(reader.data(), None);

        // Stale parcels must not carry over into the next read.
        reader.got_parcel(4, all[4].1);
        assert!(!reader.is_finished());

        let mut completions = 0;
        for (seq, payload) in all.iter().rev() {
            if reader.got_parcel(*seq, *payload) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(reader.data(), Some(data));
    }

    #[test]
    fn test_reset_keeps_undelivered_completion() {
        let first = source(CONFIG_LEN);
        let second: Vec<u8> = first.iter().map(|b| !b).collect();
        let mut reader = ConfigReader::new(CONFIG_LEN);

        for (seq, payload) in parcels(&first) {
            reader.got_parcel(seq, payload);
        }
        let finished = reader.generation();
        assert_eq!(reader.reset(), Some(first.clone()));

        for (seq, payload) in parcels(&second) {
            reader.got_parcel(seq, payload);
        }
        let current = reader.generation();

        assert_eq!(reader.take_completed(finished), Some(first));
        assert_eq!(reader.take_completed(finished), None);
        assert_eq!(reader.take_completed(current), Some(second));
        assert_eq!(reader.take_completed(current), None);
    }

    #[test]
    fn test_reset_without_completion_keeps_nothing() {
        let all = parcels(&source(CONFIG_LEN));
        let mut reader = ConfigReader::new(CONFIG_LEN);
        reader.got_parcel(all[0].0, all[0].1);
        let partial = reader.generation();

        assert_eq!(reader.reset(), None);
        assert_eq!(reader.take_completed(partial), None);
    }
}
