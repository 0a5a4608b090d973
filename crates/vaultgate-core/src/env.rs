//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness).
//! Production code uses [`SystemEnv`]; tests use the seeded
//! [`test_utils::MockEnv`] so every key, access code and timeout is
//! reproducible.

use std::time::Duration;

use rand::{CryptoRng, RngCore};

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments may use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// The ONLY async method in the trait; used by driver code, never by
    /// protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Adapter exposing an [`Environment`] as an RNG for crates that want a
/// [`RngCore`] (RSA key generation, OAEP padding).
pub struct EnvRng<'a, E: Environment>(pub &'a E);

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.0.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        self.0.random_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

// The Environment contract requires cryptographically secure entropy in
// production; MockEnv opts out only inside tests.
impl<E: Environment> CryptoRng for EnvRng<'_, E> {}

/// Production environment: system clock and OS entropy.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}

/// Deterministic environments for tests.
pub mod test_utils {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rand::{RngCore, SeedableRng, rngs::StdRng};

    use super::Environment;

    /// Deterministic environment: seeded RNG, manually-advanced clock.
    ///
    /// Clones share the same RNG stream and clock, mirroring how one
    /// process shares one entropy source.
    #[derive(Clone)]
    pub struct MockEnv {
        inner: Arc<Mutex<MockEnvInner>>,
        start: std::time::Instant,
    }

    struct MockEnvInner {
        rng: StdRng,
        elapsed: Duration,
    }

    impl MockEnv {
        /// Environment seeded with a fixed default.
        pub fn new() -> Self {
            Self::with_seed(0xBAD5_EED5)
        }

        /// Environment with an explicit RNG seed.
        pub fn with_seed(seed: u64) -> Self {
            Self {
                inner: Arc::new(Mutex::new(MockEnvInner {
                    rng: StdRng::seed_from_u64(seed),
                    elapsed: Duration::ZERO,
                })),
                start: std::time::Instant::now(),
            }
        }

        /// Advance the virtual clock.
        pub fn advance(&self, by: Duration) {
            self.lock_inner().elapsed += by;
        }

        fn lock_inner(&self) -> std::sync::MutexGuard<'_, MockEnvInner> {
            match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            self.start + self.lock_inner().elapsed
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.advance(duration);
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.lock_inner().rng.fill_bytes(buffer);
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used)]
    mod tests {
        use super::*;

        #[test]
        fn same_seed_same_bytes() {
            let a = MockEnv::with_seed(7);
            let b = MockEnv::with_seed(7);

            let mut buf_a = [0u8; 16];
            let mut buf_b = [0u8; 16];
            a.random_bytes(&mut buf_a);
            b.random_bytes(&mut buf_b);
            assert_eq!(buf_a, buf_b);
        }

        #[test]
        fn clones_share_the_rng_stream() {
            let env = MockEnv::with_seed(7);
            let clone = env.clone();

            let mut buf_a = [0u8; 16];
            let mut buf_b = [0u8; 16];
            env.random_bytes(&mut buf_a);
            clone.random_bytes(&mut buf_b);
            assert_ne!(buf_a, buf_b, "clones must continue, not restart, the stream");
        }

        #[test]
        fn clock_advances_monotonically() {
            let env = MockEnv::new();
            let t0 = env.now();
            env.advance(Duration::from_secs(5));
            let t1 = env.now();
            assert_eq!(t1 - t0, Duration::from_secs(5));
        }
    }
}
