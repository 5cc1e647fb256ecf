//! Chunk planning: how a file of a given size splits into upload parts.

use thiserror::Error;

/// Minimum chunk size (except for the last chunk). S3-compatible backends
/// reject multipart parts smaller than 5 MiB.
pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum chunk size, kept small enough for useful per-part progress
/// feedback.
pub const MAX_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("file size must be at least one byte")]
pub struct EmptyFile;

/// How a file splits into parts: parts 1..part_count-1 are exactly
/// `chunk_size` bytes, the last part covers the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub file_size: u64,
    pub chunk_size: u64,
    pub part_count: u32,
}

impl ChunkPlan {
    /// Byte range `[start, end)` of 1-based part `part_number`.
    pub fn part_span(&self, part_number: u32) -> (u64, u64) {
        let start = u64::from(part_number - 1) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.file_size);
        (start, end)
    }
}

/// Split `file_size` into parts within the default chunk bounds.
pub fn plan(file_size: u64) -> Result<ChunkPlan, EmptyFile> {
    plan_with(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, file_size)
}

/// Split `file_size` into parts with explicit chunk bounds (`min < max`).
///
/// Aims for as few parts as `max` allows, then lets `min` push the chunk
/// size up, which can shrink the part count below the first estimate. A
/// file smaller than `min` is a single part covering exactly itself.
pub fn plan_with(min: u64, max: u64, file_size: u64) -> Result<ChunkPlan, EmptyFile> {
    debug_assert!(min < max);
    if file_size == 0 {
        return Err(EmptyFile);
    }

    let initial_parts = file_size.div_ceil(max).max(1);
    let chunk_size = file_size.div_ceil(initial_parts).max(min).min(file_size);
    let part_count = file_size.div_ceil(chunk_size) as u32;

    Ok(ChunkPlan {
        file_size,
        chunk_size,
        part_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    /// Spans must tile `[0, file_size)` exactly: contiguous, no overlap,
    /// all full-size except possibly the last.
    fn assert_covers(plan: &ChunkPlan) {
        assert!(plan.part_count >= 1);
        let mut expected_start = 0;
        for part in 1..=plan.part_count {
            let (start, end) = plan.part_span(part);
            assert_eq!(start, expected_start);
            assert!(end > start);
            if part < plan.part_count {
                assert_eq!(end - start, plan.chunk_size);
            } else {
                assert!(end - start <= plan.chunk_size);
            }
            expected_start = end;
        }
        assert_eq!(expected_start, plan.file_size);
    }

    #[test]
    fn rejects_empty_files() {
        assert_eq!(plan(0), Err(EmptyFile));
    }

    #[test]
    fn single_byte_file_is_one_part() {
        let plan = plan(1).unwrap();
        assert_eq!(plan.part_count, 1);
        assert_eq!(plan.chunk_size, 1);
        assert_eq!(plan.part_span(1), (0, 1));
    }

    #[test]
    fn file_below_minimum_gets_its_own_size_as_chunk() {
        let plan = plan(3 * MIB).unwrap();
        assert_eq!(plan.part_count, 1);
        assert_eq!(plan.chunk_size, 3 * MIB);
        assert_covers(&plan);
    }

    #[test]
    fn file_at_maximum_is_one_full_part() {
        let plan = plan(MAX_CHUNK_SIZE).unwrap();
        assert_eq!(plan.part_count, 1);
        assert_eq!(plan.chunk_size, MAX_CHUNK_SIZE);
        assert_covers(&plan);
    }

    #[test]
    fn file_just_over_maximum_splits_evenly() {
        let plan = plan(MAX_CHUNK_SIZE + 1).unwrap();
        assert_eq!(plan.part_count, 2);
        assert!(plan.chunk_size >= MIN_CHUNK_SIZE);
        assert_covers(&plan);
    }

    #[test]
    fn part_count_is_recomputed_after_the_minimum_floor() {
        // Bounds (5, 8), 9 MiB file: initial estimate is 2 parts of
        // ceil(9/2) = 4.5 MiB, the floor raises the chunk to 5 MiB, and the
        // recompute keeps the count consistent with the larger chunk.
        let plan = plan_with(5 * MIB, 8 * MIB, 9 * MIB).unwrap();
        assert_eq!(plan.chunk_size, 5 * MIB);
        assert_eq!(plan.part_count, 2);
        assert_eq!(plan.part_span(2), (5 * MIB, 9 * MIB));
        assert_covers(&plan);
    }

    #[test]
    fn worked_example_120mib_with_50mib_ceiling() {
        // ceil(120/50) = 3 parts, chunk = max(ceil(120/3), 5) = 40 MiB,
        // recomputed part count stays 3.
        let plan = plan_with(5 * MIB, 50 * MIB, 120 * MIB).unwrap();
        assert_eq!(plan.part_count, 3);
        assert_eq!(plan.chunk_size, 40 * MIB);
        assert_eq!(plan.part_span(1), (0, 40 * MIB));
        assert_eq!(plan.part_span(2), (40 * MIB, 80 * MIB));
        assert_eq!(plan.part_span(3), (80 * MIB, 120 * MIB));
    }

    #[test]
    fn plans_cover_a_range_of_sizes_without_gaps() {
        let sizes = [
            1,
            MIN_CHUNK_SIZE - 1,
            MIN_CHUNK_SIZE,
            MIN_CHUNK_SIZE + 1,
            42 * MIB,
            MAX_CHUNK_SIZE - 1,
            MAX_CHUNK_SIZE,
            MAX_CHUNK_SIZE + 1,
            250 * MIB,
            999 * MIB + 12345,
            1024 * MIB,
        ];
        for size in sizes {
            let plan = plan(size).unwrap();
            assert!(plan.chunk_size >= MIN_CHUNK_SIZE || plan.chunk_size == size);
            assert_covers(&plan);
        }
    }
}
