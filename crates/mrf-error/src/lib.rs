use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

pub type MrfResult<T> = Result<T, MrfError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidConfig,
    InvalidParameter,
    ShapeMismatch,
    ZeroNormalisation,
    ZeroBelief,
    NaNAccumulator,
    DivergentSeparator,
    NotConverged,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

/// Errors surfaced by the factor algebra, clique tree, and EM driver.
///
/// Everything here is data-dependent (bad evidence, a degenerate dataset, a
/// pathological clique tree) rather than a programmer bug; shape bugs internal
/// to the algebra are caught by `debug_assert!` at the call site instead.
#[derive(Debug)]
pub enum MrfError {
    InvalidConfig {
        message: ErrString,
    },
    InvalidParameter {
        message: ErrString,
    },
    /// Paired factor operands disagree on variable list or cardinalities.
    ShapeMismatch {
        message: ErrString,
    },
    /// `Normalize` was asked to divide by a zero sum.
    ZeroNormalisation {
        message: ErrString,
    },
    /// A calibrated clique belief summed to zero.
    ZeroBelief {
        message: ErrString,
    },
    /// A factor value became `NaN`.
    NaNAccumulator {
        message: ErrString,
    },
    /// The distribute pass divided a nonzero numerator by a zero separator.
    DivergentSeparator {
        message: ErrString,
    },
    /// EM reached `max_iterations` before the convergence threshold was met.
    NotConverged {
        iterations: usize,
        delta: f64,
    },

    Context {
        context: ErrorContext,
        source: Box<MrfError>,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
}

impl MrfError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            Self::ShapeMismatch { .. } => ErrorCode::ShapeMismatch,
            Self::ZeroNormalisation { .. } => ErrorCode::ZeroNormalisation,
            Self::ZeroBelief { .. } => ErrorCode::ZeroBelief,
            Self::NaNAccumulator { .. } => ErrorCode::NaNAccumulator,
            Self::DivergentSeparator { .. } => ErrorCode::DivergentSeparator,
            Self::NotConverged { .. } => ErrorCode::NotConverged,
            Self::Context { .. } => ErrorCode::Context,
        }
    }

    pub fn with_context(self, msg: impl Into<String>) -> Self {
        MrfError::Context {
            context: ErrorContext::new(msg),
            source: Box::new(self),
            #[cfg(feature = "backtrace")]
            backtrace: Backtrace::capture(),
        }
    }
}

impl Display for MrfError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { message } => write!(f, "invalid configuration: {}", message),
            Self::InvalidParameter { message } => write!(f, "invalid parameter: {}", message),
            Self::ShapeMismatch { message } => write!(f, "shape mismatch: {}", message),
            Self::ZeroNormalisation { message } => write!(f, "zero normalisation: {}", message),
            Self::ZeroBelief { message } => write!(f, "zero belief: {}", message),
            Self::NaNAccumulator { message } => write!(f, "NaN accumulator: {}", message),
            Self::DivergentSeparator { message } => write!(f, "divergent separator: {}", message),
            Self::NotConverged { iterations, delta } => write!(
                f,
                "EM did not converge after {} iterations (delta = {})",
                iterations, delta
            ),
            Self::Context { context, source, .. } => write!(f, "{}\nCaused by: {}", context, source),
        }
    }
}

impl std::error::Error for MrfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ErrorContext {
    message: String,
}

impl ErrorContext {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorContext {}

pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> MrfResult<T>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> MrfResult<T>;
}

impl<T, E: Into<MrfError>> ResultExt<T> for Result<T, E> {
    fn context(self, msg: impl Into<String>) -> MrfResult<T> {
        self.map_err(|e| e.into().with_context(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> MrfResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[doc(hidden)]
pub mod __private {
    #[inline]
    #[cold]
    #[must_use]
    pub fn must_use<E>(e: E) -> E {
        e
    }
}

#[macro_export]
macro_rules! mrf_err {
    (ShapeMismatch: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MrfError::ShapeMismatch { message: format!($fmt, $($arg),*).into() })
    };
    (ZeroNormalisation: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MrfError::ZeroNormalisation { message: format!($fmt, $($arg),*).into() })
    };
    (ZeroBelief: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MrfError::ZeroBelief { message: format!($fmt, $($arg),*).into() })
    };
    (NaNAccumulator: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MrfError::NaNAccumulator { message: format!($fmt, $($arg),*).into() })
    };
    (DivergentSeparator: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MrfError::DivergentSeparator { message: format!($fmt, $($arg),*).into() })
    };
    (InvalidConfig: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MrfError::InvalidConfig { message: format!($fmt, $($arg),*).into() })
    };
    (InvalidParameter: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MrfError::InvalidParameter { message: format!($fmt, $($arg),*).into() })
    };
}

#[macro_export]
macro_rules! mrf_bail {
    ($($tt:tt)+) => { return Err($crate::mrf_err!($($tt)+)) };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($tt:tt)+) => {
        if !$cond { $crate::mrf_bail!($($tt)+); }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let e = mrf_err!(ShapeMismatch: "scope {} vs {}", 3, 4);
        assert!(e.to_string().contains("scope 3 vs 4"));
        assert_eq!(e.code(), ErrorCode::ShapeMismatch);
    }

    #[test]
    fn context_chains_source() {
        let e = mrf_err!(ZeroBelief: "clique 2").with_context("calibrating row 7");
        let rendered = e.to_string();
        assert!(rendered.contains("calibrating row 7"));
        assert!(rendered.contains("clique 2"));
    }

    #[test]
    fn ensure_macro_bails() {
        fn check(x: i32) -> MrfResult<()> {
            ensure!(x > 0, InvalidParameter: "x must be positive, got {}", x);
            Ok(())
        }
        assert!(check(1).is_ok());
        assert!(check(-1).is_err());
    }
}
