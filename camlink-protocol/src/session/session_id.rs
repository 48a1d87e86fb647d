use core::fmt::Write as _;

use heapless::String;

use crate::driver::clock::Clock;
use crate::driver::rng::RNG;

pub const SESSION_ID_LEN: usize = 28;

/// `aabbccdd-xxxx-xxxx-xxxx-xxxx`.
pub type SessionId = String<SESSION_ID_LEN>;

/// Builds the identifier from the first four bytes of the device address,
/// the low and high halves of the millisecond uptime, and two random words.
pub async fn generate_session_id(
    mac: &[u8; 6],
    clock: &impl Clock,
    rng: &mut impl RNG,
) -> Result<SessionId, core::fmt::Error> {
    let millis = clock.now_ms() as u64;
    let random_a = rng.next_u16().await;
    let random_b = rng.next_u16().await;

    let mut id = SessionId::new();
    write!(
        id,
        "{:02x}{:02x}{:02x}{:02x}-{:04x}-{:04x}-{:04x}-{:04x}",
        mac[0],
        mac[1],
        mac[2],
        mac[3],
        millis & 0xFFFF,
        (millis >> 16) & 0xFFFF,
        random_a,
        random_b,
    )?;
    Ok(id)
}
