//! Per-asset selection of spendable notes.
//!
//! A picker holds the confirmed, unspent notes of one asset, sorted by value.
//! Every operation takes the set of nullifiers currently reserved by
//! in-flight transactions; those notes are invisible to selection.

use std::collections::HashSet;

use num_bigint::BigUint;

use crate::primitives::Nullifier;
use crate::wallet::Note;

/// Spendable-note selection over one asset.
#[derive(Debug, Clone, Default)]
pub struct NotePicker {
    // ascending by value
    notes: Vec<Note>,
}

impl NotePicker {
    /// Builds a picker from the asset's confirmed, unspent notes.
    #[must_use]
    pub fn new(mut notes: Vec<Note>) -> Self {
        notes.sort_by(|a, b| a.value.cmp(&b.value));
        Self { notes }
    }

    fn spendable<'a>(
        &'a self,
        excluded_nullifiers: &'a HashSet<Nullifier>,
    ) -> impl Iterator<Item = &'a Note> {
        self.notes
            .iter()
            .filter(move |note| !excluded_nullifiers.contains(&note.nullifier))
    }

    /// The smallest single note covering `value`, if one exists.
    #[must_use]
    pub fn pick_one(
        &self,
        value: &BigUint,
        excluded_nullifiers: &HashSet<Nullifier>,
    ) -> Option<Note> {
        self.spendable(excluded_nullifiers)
            .find(|note| note.value >= *value)
            .cloned()
    }

    /// Picks up to two notes whose combined value covers `value`.
    ///
    /// Among all coverings, the one with the least excess wins; at equal
    /// excess a single note beats a pair. Returns an empty vec when no one or
    /// two notes can cover the value.
    #[must_use]
    pub fn pick(&self, value: &BigUint, excluded_nullifiers: &HashSet<Nullifier>) -> Vec<Note> {
        let single = self.pick_one(value, excluded_nullifiers);
        let pair = self.pick_pair(value, excluded_nullifiers);

        match (single, pair) {
            (Some(note), Some((a, b))) => {
                if note.value <= a.value.clone() + &b.value {
                    vec![note]
                } else {
                    vec![a, b]
                }
            }
            (Some(note), None) => vec![note],
            (None, Some((a, b))) => vec![a, b],
            (None, None) => Vec::new(),
        }
    }

    /// The pair of distinct notes with the smallest sum covering `value`.
    fn pick_pair(
        &self,
        value: &BigUint,
        excluded_nullifiers: &HashSet<Nullifier>,
    ) -> Option<(Note, Note)> {
        let notes: Vec<&Note> = self.spendable(excluded_nullifiers).collect();
        if notes.len() < 2 {
            return None;
        }

        // notes are sorted ascending; walk the ends inward keeping the
        // smallest covering sum
        let mut low = 0;
        let mut high = notes.len() - 1;
        let mut best: Option<(usize, usize, BigUint)> = None;
        while low < high {
            let sum = notes[low].value.clone() + &notes[high].value;
            if sum >= *value {
                if best.as_ref().is_none_or(|(_, _, best_sum)| sum < *best_sum) {
                    best = Some((low, high, sum));
                }
                high -= 1;
            } else {
                low += 1;
            }
        }

        best.map(|(low, high, _)| (notes[low].clone(), notes[high].clone()))
    }

    /// All selectable notes and their combined value.
    #[must_use]
    pub fn get_spendable_notes(
        &self,
        excluded_nullifiers: &HashSet<Nullifier>,
    ) -> (Vec<Note>, BigUint) {
        let notes: Vec<Note> = self.spendable(excluded_nullifiers).cloned().collect();
        let sum = notes.iter().map(|note| &note.value).sum();
        (notes, sum)
    }

    /// Combined value of all selectable notes.
    #[must_use]
    pub fn get_spendable_sum(&self, excluded_nullifiers: &HashSet<Nullifier>) -> BigUint {
        self.spendable(excluded_nullifiers)
            .map(|note| &note.value)
            .sum()
    }

    /// The largest value reachable with at most two notes.
    #[must_use]
    pub fn get_max_spendable_value(&self, excluded_nullifiers: &HashSet<Nullifier>) -> BigUint {
        let mut values: Vec<&BigUint> = self
            .spendable(excluded_nullifiers)
            .map(|note| &note.value)
            .collect();
        values.sort();
        values.iter().rev().take(2).copied().sum()
    }

    /// Combined value of every note in the picker, exclusions ignored.
    ///
    /// This is the user's local confirmed balance for the asset.
    #[must_use]
    pub fn get_sum(&self) -> BigUint {
        self.notes.iter().map(|note| &note.value).sum()
    }

    /// True when the picker holds no notes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl FromIterator<Note> for NotePicker {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use num_traits::Zero;

    use super::*;
    use crate::primitives::{AccountId, Commitment, PublicKey};

    fn note(value: u64, tag: u8) -> Note {
        Note {
            asset_id: 0,
            value: BigUint::from(value),
            commitment: Commitment([tag; 32]),
            secret: [0; 32],
            nullifier: Nullifier([tag; 32]),
            nullified: false,
            owner: AccountId::new(PublicKey([1; 64]), 0),
            creator_pubkey: [0; 32],
            input_nullifier: Nullifier::ZERO,
            index: u64::from(tag),
            allow_chain: false,
            pending: false,
        }
    }

    fn picker(values: &[u64]) -> NotePicker {
        NotePicker::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| note(*v, i as u8 + 1))
                .collect(),
        )
    }

    fn values(notes: &[Note]) -> Vec<u64> {
        notes
            .iter()
            .map(|n| u64::try_from(&n.value).unwrap())
            .collect()
    }

    #[test]
    fn pick_one_prefers_smallest_covering_note() {
        let picker = picker(&[10, 40, 70]);
        let picked = picker.pick_one(&BigUint::from(30u32), &HashSet::new()).unwrap();
        assert_eq!(picked.value, BigUint::from(40u32));

        assert!(picker.pick_one(&BigUint::from(80u32), &HashSet::new()).is_none());
    }

    #[test]
    fn pick_prefers_least_excess() {
        // single note 100 covers 90 with excess 10; pair 50+45 covers with 5
        let picker = picker(&[45, 50, 100]);
        let picked = picker.pick(&BigUint::from(90u32), &HashSet::new());
        assert_eq!(values(&picked), vec![45, 50]);
    }

    #[test]
    fn pick_prefers_single_note_at_equal_excess() {
        let picker = picker(&[40, 60, 100]);
        let picked = picker.pick(&BigUint::from(100u32), &HashSet::new());
        assert_eq!(values(&picked), vec![100]);
    }

    #[test]
    fn pick_falls_back_to_pair_when_no_single_covers() {
        let picker = picker(&[30, 80]);
        let picked = picker.pick(&BigUint::from(100u32), &HashSet::new());
        assert_eq!(values(&picked), vec![30, 80]);
    }

    #[test]
    fn pick_returns_empty_when_uncoverable() {
        let picker = picker(&[10, 20, 30]);
        assert!(picker.pick(&BigUint::from(100u32), &HashSet::new()).is_empty());
    }

    #[test]
    fn excluded_nullifiers_are_invisible() {
        let picker = picker(&[10, 40, 70]);
        let excluded: HashSet<Nullifier> = [Nullifier([2; 32])].into(); // the 40 note

        let picked = picker.pick_one(&BigUint::from(30u32), &excluded).unwrap();
        assert_eq!(picked.value, BigUint::from(70u32));
        assert_eq!(picker.get_spendable_sum(&excluded), BigUint::from(80u32));
        assert_eq!(picker.get_sum(), BigUint::from(120u32));
    }

    #[test]
    fn max_spendable_value_is_top_two() {
        let note_picker = picker(&[10, 40, 70]);
        assert_eq!(
            note_picker.get_max_spendable_value(&HashSet::new()),
            BigUint::from(110u32)
        );

        let single = picker(&[25]);
        assert_eq!(
            single.get_max_spendable_value(&HashSet::new()),
            BigUint::from(25u32)
        );

        assert!(picker(&[]).get_max_spendable_value(&HashSet::new()).is_zero());
    }

    #[test]
    fn spendable_notes_reports_notes_and_sum() {
        let picker = picker(&[10, 40]);
        let (notes, sum) = picker.get_spendable_notes(&HashSet::new());
        assert_eq!(notes.len(), 2);
        assert_eq!(sum, BigUint::from(50u32));
    }
}
