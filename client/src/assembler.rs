//! Reassembly of multi-part command responses
//!
//! A response too large for one datagram arrives as `total` fragments, each
//! tagged with its index. Fragments can arrive in any order and interleave
//! with fragments of other commands; the pending-command registry keeps one
//! [`MultiPartAssembly`] per sequence number.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// A fragment declared a different part count than the first one did.
    #[error("fragment declares {received} parts, assembly expects {expected}")]
    TotalMismatch { expected: u8, received: u8 },
    #[error("part index {index} out of range for {total} parts")]
    IndexOutOfRange { index: u8, total: u8 },
}

#[derive(Debug, Clone)]
pub struct MultiPartAssembly {
    total: u8,
    parts: Vec<Option<Vec<u8>>>,
}

impl MultiPartAssembly {
    /// Allocates one empty slot per expected part.
    pub fn new(total: u8) -> Self {
        Self {
            total,
            parts: vec![None; total as usize],
        }
    }

    pub fn total(&self) -> u8 {
        self.total
    }

    pub fn received(&self) -> usize {
        self.parts.iter().filter(|part| part.is_some()).count()
    }

    /// Fills the slot for `index`. Receiving the same part twice overwrites
    /// it.
    pub fn insert(&mut self, index: u8, total: u8, fragment: Vec<u8>) -> Result<(), AssemblyError> {
        if total != self.total {
            return Err(AssemblyError::TotalMismatch {
                expected: self.total,
                received: total,
            });
        }

        let slot = self
            .parts
            .get_mut(index as usize)
            .ok_or(AssemblyError::IndexOutOfRange { index, total })?;
        *slot = Some(fragment);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        !self.parts.iter().any(Option::is_none)
    }

    /// Concatenates the fragments in index order, or hands the assembly back
    /// if slots are still empty.
    pub fn finish(self) -> Result<Vec<u8>, Self> {
        if !self.is_complete() {
            return Err(self);
        }

        Ok(self.parts.into_iter().flatten().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(order: &[u8]) -> Vec<u8> {
        let mut assembly = MultiPartAssembly::new(3);
        for &index in order {
            let fragment = format!("part{};", index).into_bytes();
            assembly.insert(index, 3, fragment).unwrap();
        }
        assembly.finish().expect("assembly should be complete")
    }

    #[test]
    fn test_in_order_assembly() {
        assert_eq!(assemble(&[0, 1, 2]), b"part0;part1;part2;".to_vec());
    }

    #[test]
    fn test_assembly_is_order_independent() {
        assert_eq!(assemble(&[2, 0, 1]), assemble(&[0, 1, 2]));
        assert_eq!(assemble(&[1, 2, 0]), assemble(&[0, 1, 2]));
    }

    #[test]
    fn test_incomplete_assembly_is_returned() {
        let mut assembly = MultiPartAssembly::new(3);
        assembly.insert(0, 3, b"a".to_vec()).unwrap();
        assembly.insert(2, 3, b"c".to_vec()).unwrap();

        assert!(!assembly.is_complete());
        assert_eq!(assembly.received(), 2);

        let mut assembly = assembly.finish().unwrap_err();
        assembly.insert(1, 3, b"b".to_vec()).unwrap();
        assert_eq!(assembly.finish().unwrap(), b"abc".to_vec());
    }

    #[test]
    fn test_duplicate_fragment_overwrites() {
        let mut assembly = MultiPartAssembly::new(2);
        assembly.insert(0, 2, b"old".to_vec()).unwrap();
        assembly.insert(0, 2, b"new".to_vec()).unwrap();
        assembly.insert(1, 2, b"!".to_vec()).unwrap();

        assert_eq!(assembly.finish().unwrap(), b"new!".to_vec());
    }

    #[test]
    fn test_total_mismatch_is_rejected() {
        let mut assembly = MultiPartAssembly::new(3);
        let error = assembly.insert(0, 4, b"x".to_vec()).unwrap_err();

        assert_eq!(
            error,
            AssemblyError::TotalMismatch {
                expected: 3,
                received: 4
            }
        );
        assert_eq!(assembly.received(), 0);
    }

    #[test]
    fn test_index_out_of_range_is_rejected() {
        let mut assembly = MultiPartAssembly::new(2);
        assert!(matches!(
            assembly.insert(5, 2, b"x".to_vec()),
            Err(AssemblyError::IndexOutOfRange { index: 5, total: 2 })
        ));
    }

    #[test]
    fn test_empty_fragments_still_complete() {
        let mut assembly = MultiPartAssembly::new(2);
        assembly.insert(1, 2, Vec::new()).unwrap();
        assembly.insert(0, 2, b"only".to_vec()).unwrap();
        assert_eq!(assembly.finish().unwrap(), b"only".to_vec());
    }
}
