//! Capability flags advertised by source drivers.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// What a source can do. Used for listing and for read-port decisions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SourceCapabilities: u32 {
        /// Samples arrive at the hardware rate and are lost if not read in time.
        const REAL_TIME = 1 << 0;
        /// The stream can be rewound.
        const SEEKABLE = 1 << 1;
        /// The stream ends.
        const FINITE = 1 << 2;
        /// The stream never ends on its own.
        const INFINITE = 1 << 3;
        /// Reads can be paced to the nominal sample rate.
        const THROTTLE = 1 << 4;
        /// Center frequency can be changed.
        const TUNABLE = 1 << 5;
    }
}

impl fmt::Display for SourceCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for (i, (name, _)) in self.iter_names().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(&name.to_ascii_lowercase())?;
        }
        Ok(())
    }
}
