//! JDK discovery, rule-file generation, tool resolution and invocation for
//! the ProGuard and R8 bytecode shrinkers.

pub mod cache;
pub mod error;
pub mod invoke;
pub mod jdk;
pub mod rules;
pub mod strategy;
pub mod toolchain;

pub use cache::ClasspathCache;
pub use error::ShrinkerError;
pub use invoke::{InvokeContext, InvokeResult, ShrinkerCommand};
pub use jdk::{detect_jdk, JdkInfo, JdkLibraries};
pub use strategy::{strategy_for, JarLayout, ShrinkerStrategy};
pub use toolchain::ToolResolver;
