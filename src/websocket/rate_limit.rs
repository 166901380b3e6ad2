//! Per-connection command-rate ceiling (§5 "Cancellation and timeouts",
//! SPEC_FULL §10.9)
//!
//! One unkeyed `governor` limiter per command kind per connection, the same
//! crate the teacher reaches for in `middleware/governor.rs` for its HTTP
//! rate limiting, generalized here to the two wire commands this domain
//! ceilings (chat, move) instead of HTTP routes.

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn build_limiter(rate_per_sec: u32) -> DirectRateLimiter {
    let quota = Quota::per_second(NonZeroU32::new(rate_per_sec.max(1)).unwrap());
    RateLimiter::direct(quota)
}

/// Tracks the two rate-limited command kinds for one connection (§5, §6.3).
pub struct ConnectionRateLimiter {
    chats: DirectRateLimiter,
    moves: DirectRateLimiter,
}

impl ConnectionRateLimiter {
    pub fn new(chats_per_sec: u32, moves_per_sec: u32) -> Self {
        Self {
            chats: build_limiter(chats_per_sec),
            moves: build_limiter(moves_per_sec),
        }
    }

    pub fn allow_chat(&self) -> bool {
        self.chats.check().is_ok()
    }

    pub fn allow_move(&self) -> bool {
        self.moves.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn allows_up_to_the_configured_burst_then_blocks() {
        let limiter = ConnectionRateLimiter::new(2, 100);
        assert!(limiter.allow_chat());
        assert!(limiter.allow_chat());
        assert!(!limiter.allow_chat());
    }

    #[test]
    fn refills_over_time() {
        let limiter = ConnectionRateLimiter::new(10, 10);
        for _ in 0..10 {
            assert!(limiter.allow_move());
        }
        assert!(!limiter.allow_move());

        sleep(Duration::from_millis(150));
        assert!(limiter.allow_move());
    }

    #[test]
    fn chat_and_move_buckets_are_independent() {
        let limiter = ConnectionRateLimiter::new(1, 1);
        assert!(limiter.allow_chat());
        assert!(!limiter.allow_chat());
        assert!(limiter.allow_move());
    }
}
