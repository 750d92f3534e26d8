//! Application hash: the link digest and the rank digest folded together.
//!
//! The combination is a byte-wise XOR. It is not a cryptographic commitment:
//! any change that flips the same bits in both digests goes unnoticed.

use crate::error::HashError;

/// A subsystem digest together with the height it reflects.
#[derive(Clone, Copy, Debug)]
pub struct SubsystemDigest<'a> {
    pub digest: &'a [u8],
    pub height: u64,
}

pub fn combine(link: &[u8], rank: &[u8]) -> Result<Vec<u8>, HashError> {
    if link.len() != rank.len() {
        return Err(HashError::LengthMismatch {
            link: link.len(),
            rank: rank.len(),
        });
    }
    Ok(link.iter().zip(rank).map(|(a, b)| a ^ b).collect())
}

/// Hash reported after committing `last_height`. Empty before the first block.
pub fn app_hash(
    last_height: u64,
    link: SubsystemDigest<'_>,
    rank: SubsystemDigest<'_>,
) -> Result<Vec<u8>, HashError> {
    if last_height == 0 {
        return Ok(Vec::new());
    }
    if link.height != last_height || rank.height != last_height {
        return Err(HashError::HeightMismatch {
            link: link.height,
            rank: rank.height,
        });
    }
    combine(link.digest, rank.digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(digest: &[u8], height: u64) -> SubsystemDigest<'_> {
        SubsystemDigest { digest, height }
    }

    #[test]
    fn test_empty_before_first_block() {
        assert_eq!(app_hash(0, at(&[1, 2], 0), at(&[3], 7)), Ok(Vec::new()));
    }

    #[test]
    fn test_xor_of_digests() {
        assert_eq!(
            app_hash(4, at(&[0b1100, 0xff], 4), at(&[0b1010, 0x0f], 4)),
            Ok(vec![0b0110, 0xf0])
        );
    }

    #[test]
    fn test_rejects_mismatches() {
        assert_eq!(
            combine(&[1, 2, 3], &[1, 2]),
            Err(HashError::LengthMismatch { link: 3, rank: 2 })
        );
        assert_eq!(
            app_hash(5, at(&[1], 5), at(&[1], 4)),
            Err(HashError::HeightMismatch { link: 5, rank: 4 })
        );
    }

    proptest! {
        #[test]
        fn prop_combine_is_symmetric_xor(pairs in proptest::collection::vec(any::<(u8, u8)>(), 0..64)) {
            let (link, rank): (Vec<u8>, Vec<u8>) = pairs.into_iter().unzip();
            let combined = combine(&link, &rank).unwrap();
            prop_assert_eq!(&combined, &combine(&rank, &link).unwrap());
            // XOR with either input recovers the other
            prop_assert_eq!(combine(&combined, &rank).unwrap(), link);
        }
    }
}
