//! # Credentials
//!
//! One opaque credential per participant, handed out by the admin after a draw.
//!
//! - 8 characters, each sampled independently from the 62 symbol alphabet
//! - No dedup against other credentials of the same draw, 62^8 is plenty for a family
//! - Regenerated wholesale on every draw
use rand::Rng;

pub const CREDENTIAL_LENGTH: usize = 8;

pub const CHARSET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CREDENTIAL_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
