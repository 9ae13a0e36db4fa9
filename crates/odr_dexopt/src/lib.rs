//! Running the ahead-of-time compiler.
//!
//! Every compiler invocation is a [`Dex2oatInvocation`]: the flag vector,
//! the opened inputs whose descriptors the child inherits, and the
//! [`StagedFile`](odr_publish::StagedFile) outputs that are published as a
//! group only when the compiler succeeds. [`Dexopter`] builds invocations for
//! individual requests, and the refresh loop builds them for boot extensions
//! and system server jars. A shared [`CancellationToken`] kills every child
//! started under it.

#![warn(missing_docs)]

pub mod cancel;
pub mod cmdline;
pub mod dexopter;
pub mod error;
pub mod invocation;
pub mod priority;

pub use cancel::CancellationToken;
pub use cmdline::CmdlineBuilder;
pub use dexopter::{Dexopter, DexoptRequest, DexoptResult};
pub use error::DexoptError;
pub use invocation::{
    class_loader_context, BootExtensionUnit, Dex2oatInvocation, InvocationOutcome,
    SystemServerUnit,
};
pub use priority::{PriorityClass, ResourceHints, SystemProperties};
