//! Message-context helpers shared by the library crates' error enums.

/// Error types that can be built from a plain message.
///
/// A crate implements this for its own `Error` and expands [`impl_context!`]
/// in its error module to get `.context()` / `.with_context()` on `Result`
/// and `Option`.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait.
///
/// The invoking module must define `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`.
///
/// ```ignore
/// // crates/media/src/error.rs
/// tgirc_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T>: Sized {
            /// Attach a lazily built message to the failure.
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;

            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(move || context)
            }
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    let message = format!("{}: {source}", f().into());
                    <Error as $crate::FromMessage>::from_message(message)
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
