//! # edfcore
//!
//! A record-oriented engine for EDF and EDF+ recordings: selective attach,
//! lazy record loading, signal editing and structural rewrites.
//!
//! A recording is attached with [`Edf::open`]. Only the header is read up
//! front; data records are decoded on first access and cached. Time is
//! expressed in time points of 100 ns ([`EDF_TIME_DIMENSION`] per second).
//!
//! ## Reading
//!
//! ```rust
//! use edfcore::{Edf, Result, EDF_TIME_DIMENSION};
//!
//! fn main() -> Result<()> {
//!     # edfcore::doctest_utils::create_multi_channel_test_file("lib_read.edf", 10)?;
//!     // only attach two of the channels
//!     let mut edf = Edf::open("lib_read.edf", "subject-1", &["C4", "M*"])?;
//!     println!("{}", edf.header().summary());
//!
//!     let c4 = edf.header().signal("C4")?;
//!     let first_second = edf.read_physical_slice(0, EDF_TIME_DIMENSION, c4, 1)?;
//!     assert_eq!(first_second.len(), 128);
//!     # std::fs::remove_file("lib_read.edf").ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Editing and writing
//!
//! ```rust
//! use edfcore::{Edf, ReferenceOptions, Result};
//!
//! fn main() -> Result<()> {
//!     # edfcore::doctest_utils::create_multi_channel_test_file("lib_edit.edf", 10)?;
//!     let mut edf = Edf::open("lib_edit.edf", "subject-1", &[])?;
//!
//!     // C4 against the mean of the mastoids, as a new channel
//!     let options = ReferenceOptions::new().with_new_channel("C4-M", None);
//!     edf.reference_by_label("C4", "M1,M2", &options)?;
//!
//!     // drop records 2 and 5, leaving an EDF+D recording
//!     edf.timeline_mut().mask_records([2, 5]);
//!     let report = edf.restructure()?;
//!     assert_eq!(report.records_after, 8);
//!
//!     edf.write("lib_edit_out.edf", false)?;
//!     # std::fs::remove_file("lib_edit.edf").ok();
//!     # std::fs::remove_file("lib_edit_out.edf").ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Physical vs digital values
//!
//! Samples are stored as 16-bit integers. Each channel maps them to physical
//! units through a [`Scaling`] derived from its physical and digital ranges:
//!
//! ```rust
//! use edfcore::SignalParam;
//!
//! let signal = SignalParam::data("EEG", 256, -200.0, 200.0);
//! assert!((signal.to_physical(signal.to_digital(0.0))).abs() < 1e-3);
//! ```

pub mod codec;
pub mod compressed;
pub mod config;
pub mod continuity;
pub mod dsp;
pub mod error;
pub mod header;
pub mod ingest;
pub mod labels;
pub mod mutation;
pub mod reader;
pub mod record;
pub mod regrid;
pub mod restructure;
pub mod scaling;
pub mod source;
pub mod store;
pub mod timeline;
pub mod types;
pub mod utils;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils;

pub use config::{EngineConfig, Endianness};
pub use error::{EdfError, ErrorKind, Result};
pub use header::{ChannelCounts, EdfHeader};
pub use labels::{LabelAliases, Selection};
pub use mutation::ReferenceOptions;
pub use reader::{Edf, Slice};
pub use record::{ChannelData, Record};
pub use restructure::RestructureReport;
pub use scaling::Scaling;
pub use timeline::{Interval, RecordSpan, RecordTimeline, Timeline, TimelineSpec};
pub use types::{FileType, SignalParam};

/// Time points per second (100 ns resolution).
pub const EDF_TIME_DIMENSION: u64 = 10_000_000;

/// Library version
///
/// # Examples
///
/// ```rust
/// let version = edfcore::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
