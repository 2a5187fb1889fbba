const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a over a sequence of byte chunks. Stable across processes, unlike
/// `DefaultHasher`.
fn fnv1a<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> u64 {
    chunks
        .into_iter()
        .flatten()
        .fold(FNV_OFFSET_BASIS, |state, &byte| {
            (state ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
}

/// Seed for one world's random streams. `stream` separates independent
/// consumers so they never share a sequence.
pub fn world_seed(base_seed: u64, world_id: &str, stream: &str) -> u64 {
    base_seed ^ fnv1a([world_id.as_bytes(), &[0xff_u8][..], stream.as_bytes()])
}
