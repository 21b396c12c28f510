//! Recovery, extraction and bounded in-place patching of FSB4 audio banks
//! embedded in XXX containers.

pub mod audio;
pub mod batch;
pub mod config;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod formats;
pub mod fsb;
pub mod patch;
pub mod scan;

pub use batch::{BatchReport, ItemFailure};
pub use config::{MagicPolicy, ToolConfig};
pub use cursor::{ByteCursor, ByteRange};
pub use error::{BoundsError, Error, FormatError, PatchError, Result};
pub use extract::{ExtractManifest, ExtractReport};
pub use fsb::{Codec, Detected, Fsb4Mode, FsbBank, FsbBankHeader, Inconsistency, Sample};
pub use patch::{PatchOutcome, SampleRef};
pub use scan::{BankRecord, BankVersion, ScanReport};
