//! `Error` and `Result` types arising out of wire operations.

use std::fmt;
use std::error;
use std::result;
use std::ops::Deref;
use std::borrow::Cow;
use bson::document::ValueAccessError;
use backtrace::Backtrace;

/// The common interface of every error this crate produces or wraps.
#[allow(clippy::module_name_repetitions)]
pub trait ErrorExt: error::Error + Send + Sync {
    /// The error this one was raised because of, kept as an `ErrorExt`
    /// so that its kind stays reachable.
    fn reason(&self) -> Option<&(dyn ErrorExt + 'static)> {
        None
    }

    /// The backtrace captured closest to the root cause.
    fn backtrace(&self) -> Option<&Backtrace> {
        self.reason().and_then(ErrorExt::backtrace)
    }

    /// Structured error kind.
    fn kind(&self) -> ErrorKind;

    /// `self`, viewed as a plain standard error.
    fn as_std_error(&self) -> &(dyn error::Error + 'static);
}

/// Adds context to a failed `Result` while passing it on.
pub trait ResultExt<T>: Sized {
    /// Wraps an `Err` in a new error carrying `message`; the original
    /// error becomes its cause and lends it its kind. `Ok` passes through.
    /// ```
    /// # use drupe::error::{ Error, ErrorKind, ErrorExt, Result, ResultExt };
    /// #
    /// # fn main() -> Result<()> {
    /// let ok: Result<_> = Ok("success!");
    /// let ok_chained = ok.chain("dummy error message")?;
    /// assert_eq!(ok_chained, "success!");
    ///
    /// let err: Result<i32> = Err(Error::new(
    ///     ErrorKind::Transport, "chained cause"
    /// ));
    /// let err_chained = err.chain("top-level message").unwrap_err();
    /// assert_eq!(err_chained.message(), "top-level message");
    /// assert_eq!(err_chained.kind(), ErrorKind::Transport);
    /// # Ok(())
    /// # }
    /// ```
    fn chain<M: ErrMsg>(self, message: M) -> Result<T>;
}

/// Anything usable as the message of a chained error.
pub trait ErrMsg: Sized {
    /// Produces the message.
    fn into_message(self) -> Cow<'static, str>;
}

/// `Result` with this crate's `Error`.
pub type Result<T> = result::Result<T, Error>;

impl<T, E> ResultExt<T> for result::Result<T, E> where E: ErrorExt + 'static {
    fn chain<M: ErrMsg>(self, message: M) -> Result<T> {
        self.map_err(|cause| Error::with_cause(message.into_message(), cause))
    }
}

/// Static messages are used as they are.
impl ErrMsg for &'static str {
    fn into_message(self) -> Cow<'static, str> {
        Cow::Borrowed(self)
    }
}

/// Closures are only called when there is an error to report.
impl<F> ErrMsg for F where F: FnOnce() -> String {
    fn into_message(self) -> Cow<'static, str> {
        Cow::Owned(self())
    }
}

/// What went wrong, coarsely, for callers that branch on failures.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No response could be obtained: the connection failed, or the
    /// failover strategy ran out of retries.
    Transport,
    /// The server acknowledged a write, but reported that it rejected
    /// or only partially applied it.
    WriteFailure,
    /// The server answered a query with an `$err` document.
    QueryFailure,
    /// The server answered a command with `ok: 0`.
    CommandFailure,
    /// The server no longer knows about the cursor being iterated.
    CursorNotFound,
    /// A value could not be turned into a document.
    BsonEncoding,
    /// A document could not be turned into a value, or the bytes of a
    /// reply did not hold a well-formed document.
    BsonDecoding,
    /// JSON did not convert to a document, or the other way round.
    JsonTranscoding,
    /// A document lacks a field that had to be there.
    MissingDocumentField,
    /// A document field holds a value of the wrong type.
    IllTypedDocumentField,
    /// A configuration value is out of its permitted range.
    Configuration,
    /// A collection name is empty.
    InvalidName,
}

impl ErrorKind {
    /// A short description, used as the prefix of displayed errors.
    pub fn as_str(self) -> &'static str {
        use self::ErrorKind::*;

        match self {
            Transport             => "transport failure",
            WriteFailure          => "write rejected by server",
            QueryFailure          => "query rejected by server",
            CommandFailure        => "command rejected by server",
            CursorNotFound        => "cursor not found on server",
            BsonEncoding          => "BSON encoding error",
            BsonDecoding          => "BSON decoding error",
            JsonTranscoding       => "JSON transcoding error",
            MissingDocumentField  => "document field not found",
            IllTypedDocumentField => "document field of unexpected type",
            Configuration         => "invalid configuration",
            InvalidName           => "invalid collection name",
        }
    }

    /// Whether the server received the request and answered it with a
    /// rejection, as opposed to the request never being answered at all.
    pub fn is_semantic(self) -> bool {
        use self::ErrorKind::*;

        match self {
            WriteFailure | QueryFailure | CommandFailure | CursorNotFound => true,
            _ => false,
        }
    }

    /// Whether a request failing with this kind of error may be resent
    /// by the failover loop. Only connection-level failures qualify.
    pub fn is_retryable(self) -> bool {
        self == ErrorKind::Transport
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Every fallible operation of this crate fails with an `Error`: a kind,
/// a message, optionally the error that caused it, and a backtrace.
#[derive(Debug)]
pub struct Error {
    /// What went wrong.
    kind: ErrorKind,
    /// Where it went wrong.
    message: Cow<'static, str>,
    /// The error being wrapped.
    cause: Option<Box<dyn ErrorExt>>,
    /// Captured here unless the cause has one already.
    backtrace: Option<Backtrace>,
}

impl Error {
    /// A root error, capturing a backtrace.
    /// ```
    /// # use drupe::error::{ Error, ErrorKind, ErrorExt };
    /// let error = Error::new(ErrorKind::CursorNotFound, "sample error message");
    /// assert_eq!(error.message(), "sample error message");
    /// assert_eq!(error.kind(), ErrorKind::CursorNotFound);
    /// assert!(error.reason().is_none());
    /// assert!(error.backtrace().is_some());
    /// ```
    pub fn new<S>(kind: ErrorKind, message: S) -> Self
        where S: Into<Cow<'static, str>>
    {
        Error {
            kind,
            message: message.into(),
            cause: None,
            backtrace: Some(Backtrace::new()),
        }
    }

    /// Wraps `cause` with a message and takes over its kind. A backtrace
    /// is only captured when `cause` doesn't carry one.
    pub fn with_cause<S, E>(message: S, cause: E) -> Self
        where S: Into<Cow<'static, str>>,
              E: ErrorExt + 'static
    {
        let kind = cause.kind();
        let message = message.into();
        let backtrace = if cause.backtrace().is_none() {
            Some(Backtrace::new())
        } else {
            None
        };
        let cause: Option<Box<dyn ErrorExt>> = Some(Box::new(cause));

        Error { kind, message, cause, backtrace }
    }

    /// The outermost message, without the causes.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Walks the chain of causes and returns the first one of type `E`.
    ///
    /// This is how a `LastError` can be recovered from a failed
    /// checked write.
    pub fn find_cause<E: error::Error + 'static>(&self) -> Option<&E> {
        let mut current: Option<&(dyn error::Error + 'static)> = Some(self);

        while let Some(error) = current {
            if let Some(found) = error.downcast_ref::<E>() {
                return Some(found);
            }
            current = error.source();
        }

        None
    }
}

impl ErrorExt for Error {
    fn reason(&self) -> Option<&(dyn ErrorExt + 'static)> {
        self.cause.as_ref().map(Deref::deref)
    }

    #[allow(clippy::or_fun_call)]
    fn backtrace(&self) -> Option<&Backtrace> {
        self.reason().and_then(ErrorExt::backtrace).or(self.backtrace.as_ref())
    }

    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

/// The alternate form (`{:#}`) additionally prints the backtrace.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(cause) = self.cause.as_ref() {
            write!(f, ", caused by: {}", cause)?
        }

        if f.alternate() {
            if let Some(backtrace) = self.backtrace.as_ref() {
                write!(f, "; {:#?}", backtrace)?
            }
        }

        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.reason().map(ErrorExt::as_std_error)
    }
}

impl From<ValueAccessError> for Error {
    fn from(error: ValueAccessError) -> Self {
        let message = match error {
            ValueAccessError::NotPresent => "missing value for key in Document",
            ValueAccessError::UnexpectedType => "ill-typed value for key in Document",
            _ => "can't access value in Document",
        };
        Self::with_cause(message, error)
    }
}

impl ErrorExt for ValueAccessError {
    fn kind(&self) -> ErrorKind {
        match *self {
            ValueAccessError::NotPresent => ErrorKind::MissingDocumentField,
            _ => ErrorKind::IllTypedDocumentField,
        }
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

/// Makes a foreign error type convertible into `Error` with a fixed kind.
macro_rules! impl_error_type {
    ($ty:path, $kind:ident, $message:expr) => {
        impl From<$ty> for Error {
            fn from(error: $ty) -> Self {
                Self::with_cause($message, error)
            }
        }

        impl ErrorExt for $ty {
            fn kind(&self) -> ErrorKind {
                ErrorKind::$kind
            }

            fn as_std_error(&self) -> &(dyn error::Error + 'static) {
                self
            }
        }
    }
}

impl_error_type! { serde_json::Error,          JsonTranscoding, "JSON transcoding error" }
impl_error_type! { bson::extjson::de::Error,   JsonTranscoding, "extended JSON conversion error" }
impl_error_type! { bson::ser::Error,           BsonEncoding,    "BSON encoding error" }
impl_error_type! { bson::de::Error,            BsonDecoding,    "BSON decoding error" }
