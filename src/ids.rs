//! Identifiers & deterministic id derivation
//!
//! Atom and step ids are UUIDv5 derivations from a per-observation
//! **namespace**, itself derived from the code-version commit hash, the
//! observation id, and the fingerprint of the generator parameters. The
//! derivation chain is:
//!
//! ```text
//! namespace = v5(ROOT, commit || observation || md5(params))
//! atom_id   = v5(namespace, tag(sequence_type) || be32(atom_index))
//! step_id   = v5(atom_id, be32(step_index))
//! ```
//!
//! Re-running with identical inputs reproduces identical ids in any
//! process; appending execution history never changes ids already derived
//! for the same indices. Acquisition restarts get fresh ids by augmenting
//! the atom index with an id base that advances on every acquisition reset.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hashing::Fingerprint;

/// Root namespace for the whole derivation tree. Fixed for all time:
/// changing it would re-key every sequence ever generated.
pub const ROOT_NAMESPACE: Uuid = Uuid::from_u128(0x8f40_29f9_02cf_4c5a_b8a7_5d02_7c5a_31de);

// ============================================================================
// CommitHash
// ============================================================================

/// 20-byte identifier of the code version that produced a sequence.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitHash([u8; 20]);

/// Errors parsing a [`CommitHash`].
#[derive(Debug, thiserror::Error)]
pub enum CommitHashError {
    #[error("commit hash must be exactly 20 bytes (got {0})")]
    BadLength(usize),
    #[error("commit hash is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
}

impl CommitHash {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        CommitHash(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl TryFrom<&[u8]> for CommitHash {
    type Error = CommitHashError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 20] =
            bytes.try_into().map_err(|_| CommitHashError::BadLength(bytes.len()))?;
        Ok(CommitHash(arr))
    }
}

impl FromStr for CommitHash {
    type Err = CommitHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommitHash::try_from(hex::decode(s)?.as_slice())
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitHash({self})")
    }
}

// ============================================================================
// Entity ids
// ============================================================================

/// Observation id, unique within the consuming database.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObservationId(pub u64);

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o-{}", self.0)
    }
}

/// Observing visit id.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VisitId(pub u64);

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v-{}", self.0)
    }
}

/// Id of an emitted or recorded atom.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AtomId(pub Uuid);

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of an emitted or recorded step.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StepId(pub Uuid);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the two per-observation sequences a step belongs to.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SequenceType {
    Acquisition,
    Science,
}

impl SequenceType {
    /// Stable tag used in id derivation and canonical encodings. Renaming a
    /// tag re-keys every derived id, so these never change.
    pub const fn tag(self) -> &'static str {
        match self {
            SequenceType::Acquisition => "acquisition",
            SequenceType::Science => "science",
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// Derivation
// ============================================================================

/// Deterministic id derivation rooted at a per-observation namespace.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequenceIds {
    namespace: Uuid,
}

impl SequenceIds {
    /// Derive the namespace for one observation under one code version and
    /// one parameter fingerprint.
    pub fn new(commit: &CommitHash, observation: ObservationId, params: &Fingerprint) -> Self {
        let mut bytes = Vec::with_capacity(20 + 8 + 16);
        bytes.extend_from_slice(commit.as_bytes());
        bytes.extend_from_slice(&observation.0.to_be_bytes());
        bytes.extend_from_slice(params.as_bytes());
        SequenceIds { namespace: Uuid::new_v5(&ROOT_NAMESPACE, &bytes) }
    }

    #[inline]
    pub fn namespace(&self) -> Uuid {
        self.namespace
    }

    /// Derived ids for one acquisition attempt. The id base advances on
    /// every acquisition reset and re-keys the derivation, so ids issued
    /// across restarts can never collide whatever indices each attempt
    /// hands out.
    pub fn acquisition_ids(&self, id_base: u32) -> SequenceIds {
        let tag = SequenceType::Acquisition.tag().as_bytes();
        let mut bytes = Vec::with_capacity(tag.len() + 4);
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(&(id_base as i32).to_be_bytes());
        SequenceIds { namespace: Uuid::new_v5(&self.namespace, &bytes) }
    }

    /// Atom id for `(sequence type, atom index)`. For acquisition sequences
    /// the caller augments the index by the current id base.
    pub fn atom_id(&self, sequence_type: SequenceType, atom_index: u32) -> AtomId {
        let tag = sequence_type.tag().as_bytes();
        let mut bytes = Vec::with_capacity(tag.len() + 4);
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(&(atom_index as i32).to_be_bytes());
        AtomId(Uuid::new_v5(&self.namespace, &bytes))
    }

    /// Step id within an atom. The atom id already pins the namespace and
    /// sequence type, so only the step index is absorbed.
    pub fn step_id(&self, atom: AtomId, step_index: u32) -> StepId {
        StepId(Uuid::new_v5(&atom.0, &(step_index as i32).to_be_bytes()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::fingerprint;

    fn ids() -> SequenceIds {
        let commit = CommitHash::from_bytes([7u8; 20]);
        SequenceIds::new(&commit, ObservationId(214), &fingerprint(&42u32))
    }

    #[test]
    fn derivation_is_stable() {
        let a = ids();
        let b = ids();
        assert_eq!(a.namespace(), b.namespace());
        assert_eq!(
            a.atom_id(SequenceType::Science, 3),
            b.atom_id(SequenceType::Science, 3),
        );
        let atom = a.atom_id(SequenceType::Science, 3);
        assert_eq!(a.step_id(atom, 1), b.step_id(atom, 1));
    }

    #[test]
    fn namespace_depends_on_every_input() {
        let commit = CommitHash::from_bytes([7u8; 20]);
        let fp = fingerprint(&42u32);
        let base = SequenceIds::new(&commit, ObservationId(214), &fp);

        let other_commit = CommitHash::from_bytes([8u8; 20]);
        assert_ne!(
            base.namespace(),
            SequenceIds::new(&other_commit, ObservationId(214), &fp).namespace(),
        );
        assert_ne!(
            base.namespace(),
            SequenceIds::new(&commit, ObservationId(215), &fp).namespace(),
        );
        assert_ne!(
            base.namespace(),
            SequenceIds::new(&commit, ObservationId(214), &fingerprint(&43u32)).namespace(),
        );
    }

    #[test]
    fn sequence_type_and_index_separate_atom_ids() {
        let s = ids();
        assert_ne!(
            s.atom_id(SequenceType::Acquisition, 0),
            s.atom_id(SequenceType::Science, 0),
        );
        assert_ne!(
            s.atom_id(SequenceType::Science, 0),
            s.atom_id(SequenceType::Science, 1),
        );
    }

    #[test]
    fn acquisition_id_bases_never_share_ids() {
        // Each acquisition attempt derives from its own id base; the whole
        // id families of two bases are disjoint, whatever indices each
        // attempt hands out.
        let s = ids();
        let before: Vec<_> = (0..8)
            .map(|i| s.acquisition_ids(0).atom_id(SequenceType::Acquisition, i))
            .collect();
        for i in 0..8 {
            let after = s.acquisition_ids(1).atom_id(SequenceType::Acquisition, i);
            assert!(!before.contains(&after));
        }
        assert_ne!(s.acquisition_ids(0).namespace(), s.namespace());
    }

    #[test]
    fn commit_hash_hex_round_trip() {
        let c = CommitHash::from_bytes([0xab; 20]);
        let parsed: CommitHash = c.to_string().parse().unwrap();
        assert_eq!(parsed, c);
        assert!(matches!(
            "abcd".parse::<CommitHash>(),
            Err(CommitHashError::BadLength(2)),
        ));
    }
}
