//! The execution API of a running model instance.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{IdentifierHandle, OperationHandle};
use crate::value::Value;

use super::status::ModelStatusSink;

/// Random-number generator a model seeds per parallel lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RngType {
    #[default]
    Mt19937,
    Mt216091,
    Xoshiro256Plus,
    Xoshiro256StarStar,
    /// Hardware/OS true random source; seeds are ignored.
    Trng,
}

impl RngType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mt19937 => "mt19937",
            Self::Mt216091 => "mt216091",
            Self::Xoshiro256Plus => "xoshiro256+",
            Self::Xoshiro256StarStar => "xoshiro256**",
            Self::Trng => "trng",
        }
    }
}

impl fmt::Display for RngType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RngType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mt19937" => Ok(Self::Mt19937),
            "mt216091" => Ok(Self::Mt216091),
            "xoshiro256+" | "xoshiro256plus" => Ok(Self::Xoshiro256Plus),
            "xoshiro256**" | "xoshiro256starstar" => Ok(Self::Xoshiro256StarStar),
            "trng" => Ok(Self::Trng),
            other => Err(format!("unknown random number generator '{}'", other)),
        }
    }
}

/// Parameters for [`Model::start`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartOptions {
    pub rng_type: RngType,
    /// One seed per parallel lane (`number_threads` entries).
    pub seeds: Vec<u64>,
    pub working_directory: PathBuf,
    /// Stop before the first operation instead of running.
    pub start_paused: bool,
}

/// Why a model stopped through its abort path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Abort requested through [`Model::abort`].
    UserRequest,
    /// The program raised a runtime error.
    Program { code: i32, message: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRequest => f.write_str("aborted by user"),
            Self::Program { code, message } => write!(f, "runtime error {}: {}", code, message),
        }
    }
}

/// Identifier exported by a compiled module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierInfo {
    pub handle: IdentifierHandle,
    pub name: String,
    /// Whether the identifier is a variable (as opposed to a function or constant).
    pub is_variable: bool,
}

/// A running program instance produced by a model module's allocator.
///
/// All calls come from the control thread. Completion of `start`, `pause`,
/// `resume`, `single_step` and `abort` is reported asynchronously through the
/// [`ModelStatusSink`] given to `start`; the model runs on threads of its own.
///
/// Dropping a model must stop and join those threads. The owner may drop it
/// right after `abort` without waiting for the abort report.
pub trait Model: Send {
    fn start(&mut self, options: StartOptions, status: ModelStatusSink);

    fn pause(&mut self);

    /// Returns `false` if the model is not paused.
    fn resume(&mut self) -> bool;

    /// Execute exactly one operation, then pause again.
    fn single_step(&mut self) -> bool;

    fn abort(&mut self);

    fn set_break_at_operation(&mut self, handle: OperationHandle, now_set: bool) -> bool;

    /// Set (or clear, with `None`) the one-shot run-to location.
    fn set_run_to_location(&mut self, handle: Option<OperationHandle>) -> bool;

    fn number_operation_handles(&self) -> u32;

    /// Number of parallel lanes the model runs on.
    fn number_threads(&self) -> u32;

    fn identifiers(&self) -> Vec<IdentifierInfo>;

    /// Current value of a variable, if it holds one.
    fn value(&self, handle: IdentifierHandle) -> Option<Value>;

    /// Overwrite a variable. Returns `false` if the model rejects the value.
    fn set_value(&mut self, handle: IdentifierHandle, value: &Value) -> bool;
}
