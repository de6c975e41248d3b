use crate::labels::LabelAliases;

/// Byte order of the 16-bit samples in each data record.
///
/// EDF mandates little-endian two's complement, but some acquisition systems
/// emit big-endian data; the choice is made once per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Default declared slot count for a synthesized time-track channel.
///
/// Each slot is two bytes, so the default leaves room for an onset such as
/// `+86399.999999` plus the two separators and the terminator.
pub const DEFAULT_TIME_TRACK_SAMPLES: usize = 15;

/// Per-engine settings threaded through header parsing and record decoding.
///
/// # Examples
///
/// ```rust
/// use edfcore::{EngineConfig, Endianness, LabelAliases};
///
/// let mut aliases = LabelAliases::new();
/// aliases.add("C4", &["EEG C4", "C4-M1"])?;
///
/// let config = EngineConfig::default()
///     .with_endianness(Endianness::Little)
///     .with_aliases(aliases)
///     .with_time_track_samples(20);
///
/// assert_eq!(config.time_track_samples, 20);
/// # Ok::<(), edfcore::EdfError>(())
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub endianness: Endianness,
    pub aliases: LabelAliases,
    pub time_track_samples: usize,
    pub skip_annotations: bool,
    pub force_edf: bool,
    pub space_replacement: Option<char>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            endianness: Endianness::Little,
            aliases: LabelAliases::new(),
            time_track_samples: DEFAULT_TIME_TRACK_SAMPLES,
            skip_annotations: false,
            force_edf: false,
            space_replacement: None,
        }
    }
}

impl EngineConfig {
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_aliases(mut self, aliases: LabelAliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_time_track_samples(mut self, samples: usize) -> Self {
        self.time_track_samples = samples.max(1);
        self
    }

    pub fn with_skip_annotations(mut self, skip: bool) -> Self {
        self.skip_annotations = skip;
        self
    }

    pub fn with_force_edf(mut self, force: bool) -> Self {
        self.force_edf = force;
        self
    }

    pub fn with_space_replacement(mut self, replacement: Option<char>) -> Self {
        self.space_replacement = replacement;
        self
    }
}
