//! Shared utilities and strongly-typed common values for workspace crates.
//!
//! ```rust
//! use bcommon::UserId;
//!
//! let user = UserId::new(42);
//! assert_eq!(user.as_i64(), 42);
//! assert_eq!(user.to_string(), "42");
//! ```

pub mod future {
    //! Shared async future aliases.
    //!
    //! ```rust
    //! use bcommon::BoxFuture;
    //!
    //! fn str_len<'a>(value: &'a str) -> BoxFuture<'a, usize> {
    //!     Box::pin(async move { value.len() })
    //! }
    //!
    //! let _future = str_len("hello");
    //! ```

    use std::future::Future;
    use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

pub mod identity {
    //! Cross-crate user identity newtype.
    //!
    //! ```rust
    //! use bcommon::UserId;
    //!
    //! let user = UserId::from(7_i64);
    //! assert_eq!(user, UserId::new(7));
    //! ```

    use std::fmt::{Display, Formatter};

    /// Opaque numeric identity assigned by the messaging transport.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct UserId(i64);

    impl UserId {
        pub fn new(value: i64) -> Self {
            Self(value)
        }

        pub fn as_i64(&self) -> i64 {
            self.0
        }
    }

    impl Display for UserId {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl From<i64> for UserId {
        fn from(value: i64) -> Self {
            Self(value)
        }
    }
}

pub use future::BoxFuture;
pub use identity::UserId;

#[cfg(test)]
mod tests {
    use super::UserId;

    #[test]
    fn user_id_round_trips_raw_value() {
        let user = UserId::new(99);
        assert_eq!(user.as_i64(), 99);
        assert_eq!(UserId::from(99), user);
        assert_eq!(user.to_string(), "99");
    }
}
