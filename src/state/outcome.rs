use futures::future::Shared;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A boxed, `Send`-able future used for the asynchronous tails of an update.
pub type BoxFuture<T = ()> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Change-detection token regenerated on every commit.
///
/// Only inequality is meaningful: two reads returning different revisions
/// mean at least one commit happened in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Revision(u64);

impl Revision {
    pub(crate) const INITIAL: Revision = Revision(0);

    pub(crate) fn next(self) -> Revision {
        Revision(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Asynchronous tail of a commit, already handed to an executor.
///
/// Awaiting it is optional: the executor drives it to completion either way,
/// and it never runs twice.
pub(crate) type Tail = Shared<BoxFuture>;

/// Result of running the update pipeline once.
#[must_use = "an update may be vetoed or refused"]
pub enum Outcome {
    /// The container was stopped; nothing happened.
    Inactive,
    /// The request carried nothing to apply (e.g. a navigation without href).
    Ignored,
    /// An `"updatestart"` handler vetoed the update.
    Vetoed,
    /// The transition hook declined to commit.
    Refused,
    /// Too many updates were nested inside each other's handlers.
    DepthExceeded,
    /// The value was committed.
    Committed(Commit),
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }

    /// Revision produced by the commit, if any.
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Outcome::Committed(commit) => Some(commit.revision),
            _ => None,
        }
    }

    /// Wait for the post-commit tail, if there is one.
    pub async fn settled(self) {
        if let Outcome::Committed(commit) = self {
            commit.completed().await;
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Inactive => f.write_str("Inactive"),
            Outcome::Ignored => f.write_str("Ignored"),
            Outcome::Vetoed => f.write_str("Vetoed"),
            Outcome::Refused => f.write_str("Refused"),
            Outcome::DepthExceeded => f.write_str("DepthExceeded"),
            Outcome::Committed(commit) => f.debug_tuple("Committed").field(commit).finish(),
        }
    }
}

/// A finished commit and its optional asynchronous tail.
pub struct Commit {
    pub revision: Revision,
    /// `false` when an `"update"` handler vetoed, which skips the complete
    /// hook and `"updateend"`.
    pub notified: bool,
    completion: Option<Tail>,
}

impl Commit {
    pub(crate) fn new(revision: Revision, notified: bool, completion: Option<Tail>) -> Self {
        Self {
            revision,
            notified,
            completion,
        }
    }

    /// Whether the complete hook left background work behind.
    pub fn is_pending(&self) -> bool {
        self.completion.is_some()
    }

    /// Await the asynchronous tail. Resolves immediately if there is none.
    ///
    /// Dropping the commit instead does not cancel the tail.
    pub async fn completed(self) {
        if let Some(completion) = self.completion {
            completion.await;
        }
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("revision", &self.revision)
            .field("notified", &self.notified)
            .field("pending", &self.is_pending())
            .finish()
    }
}
