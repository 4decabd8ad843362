use rand::RngCore;

/// Number of random bytes behind every code and token value.
const TOKEN_BYTES: usize = 32;

/// Opaque hex value used for authorization codes, access and refresh tokens.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
