use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Fixed magic value identifying an atop rawlog file.
pub const MYMAGIC: u32 = 0xfeed_beef;

/// This implementation's own version number, checked against a strict
/// `RawHeader::aversion` (high bit set). A mismatching low bit without
/// the high bit is tolerated -- cross-version compatibility mode.
pub const AVERSION: u16 = 1;
const AVERSION_STRICT_BIT: u16 = 0x8000;

/// A tiny hand-rolled substitute for the `bitflags!` macro: this crate
/// keeps its dependency footprint aligned with the teacher rather than
/// pulling in `bitflags` for two small capability sets.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn from_bits_truncate(bits: $repr) -> Self {
                $name(bits)
            }

            pub const fn bits(self) -> $repr {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

bitflags_like! {
    /// File-level capability bitset copied verbatim from the header.
    pub struct SupportFlags: u32 {
        const ACCTACTIVE = 1 << 0;
        const IOSTAT     = 1 << 1;
        const NETATOP    = 1 << 2;
        const NETATOPD   = 1 << 3;
        const CGROUPV2   = 1 << 4;
        const DOCKSTAT   = 1 << 5;
        const GPUSTAT    = 1 << 6;
        const PSI        = 1 << 7;
    }
}

bitflags_like! {
    /// Record-scoped capability bits, named after the source's `RR*` flags.
    pub struct RecordFlags: u32 {
        const RRACCTACTIVE = 1 << 0;
        const RRIOSTAT     = 1 << 1;
        const RRNETATOP    = 1 << 2;
        const RRNETATOPD   = 1 << 3;
        const RRCGRSTAT    = 1 << 4;
        const RRDOCKSTAT   = 1 << 5;
        const RRGPUSTAT    = 1 << 6;
    }
}

/// Combines a file's `supportflags` with one record's own `flags` into
/// the flat selection bitset consumed by the JSON emitter.
pub fn record_flags(hflags: SupportFlags, rflags: RecordFlags) -> SupportFlags {
    let mut out = SupportFlags::empty();
    if hflags.contains(SupportFlags::ACCTACTIVE) && rflags.contains(RecordFlags::RRACCTACTIVE) {
        out |= SupportFlags::ACCTACTIVE;
    }
    if hflags.contains(SupportFlags::IOSTAT) && rflags.contains(RecordFlags::RRIOSTAT) {
        out |= SupportFlags::IOSTAT;
    }
    if rflags.contains(RecordFlags::RRNETATOP) {
        out |= SupportFlags::NETATOP;
    }
    if rflags.contains(RecordFlags::RRNETATOPD) {
        out |= SupportFlags::NETATOPD;
    }
    if rflags.contains(RecordFlags::RRCGRSTAT) {
        out |= SupportFlags::CGROUPV2;
    }
    if rflags.contains(RecordFlags::RRDOCKSTAT) {
        out |= SupportFlags::DOCKSTAT;
    }
    if rflags.contains(RecordFlags::RRGPUSTAT) {
        out |= SupportFlags::GPUSTAT;
    }
    if hflags.contains(SupportFlags::PSI) {
        out |= SupportFlags::PSI;
    }
    out
}

/// Self-describing header at the start of every rawlog file.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct RawHeader {
    pub magic: U32,
    pub aversion: U16,
    _pad: U16,
    pub rawheadlen: U32,
    pub rawreclen: U32,
    pub sstatlen: U32,
    pub tstatlen: U32,
    pub supportflags: U32,
}

impl RawHeader {
    pub const SIZE: usize = std::mem::size_of::<RawHeader>();

    pub fn supportflags(&self) -> SupportFlags {
        SupportFlags::from_bits_truncate(self.supportflags.get())
    }

    /// Validates magic, the compiled-in frame sizes, and the version
    /// compatibility bit. `rec_len` is this build's own `size_of` for
    /// `RawRecord`. Unlike the source, `sstatlen`/`tstatlen` are not
    /// compared against a fixed compiled-in size: this port's `Sstat`
    /// and `Tstat` are variably-sized `serde`-encoded payloads rather
    /// than fixed C structs (see `crate::stat`), so those two header
    /// fields are carried through as declared metadata only.
    pub fn validate(&self, rec_len: u32) -> bool {
        if self.magic.get() != MYMAGIC {
            return false;
        }
        if self.rawheadlen.get() as usize != Self::SIZE || self.rawreclen.get() != rec_len {
            return false;
        }

        let aversion = self.aversion.get();
        if aversion & AVERSION_STRICT_BIT != 0 {
            (aversion & !AVERSION_STRICT_BIT) == AVERSION
        } else {
            true
        }
    }
}

/// Per-record header immediately preceding the compressed `sstat`/`tstat`
/// payloads.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct RawRecord {
    pub curtime: U64,
    pub interval: U32,
    pub flags: U32,
    pub scomplen: U32,
    pub pcomplen: U32,
    pub ndeviat: U32,
    pub nexit: U32,
    pub noverflow: U32,
    pub totproc: U32,
    pub nactproc: U32,
    pub totrun: U32,
    pub totslpi: U32,
    pub totslpu: U32,
    pub totzomb: U32,
}

impl RawRecord {
    pub const SIZE: usize = std::mem::size_of::<RawRecord>();

    pub fn flags(&self) -> RecordFlags {
        RecordFlags::from_bits_truncate(self.flags.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_version_mismatch_is_rejected() {
        let mut h = RawHeader::new_zeroed();
        h.magic.set(MYMAGIC);
        h.rawheadlen.set(RawHeader::SIZE as u32);
        h.rawreclen.set(10);
        h.sstatlen.set(20);
        h.tstatlen.set(30);
        h.aversion.set(AVERSION_STRICT_BIT | (AVERSION + 1));
        assert!(!h.validate(10));
    }

    #[test]
    fn non_strict_version_mismatch_is_tolerated() {
        let mut h = RawHeader::new_zeroed();
        h.magic.set(MYMAGIC);
        h.rawheadlen.set(RawHeader::SIZE as u32);
        h.rawreclen.set(10);
        h.sstatlen.set(20);
        h.tstatlen.set(30);
        h.aversion.set(AVERSION + 5); // high bit not set
        assert!(h.validate(10));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut h = RawHeader::new_zeroed();
        h.magic.set(0xdead_beef);
        assert!(!h.validate(0));
    }

    #[test]
    fn record_flags_combines_header_and_record_bits() {
        let hflags = SupportFlags::ACCTACTIVE | SupportFlags::IOSTAT;
        let rflags = RecordFlags::RRACCTACTIVE | RecordFlags::RRGPUSTAT;
        let combined = record_flags(hflags, rflags);
        assert!(combined.contains(SupportFlags::ACCTACTIVE));
        assert!(!combined.contains(SupportFlags::IOSTAT)); // record didn't carry RRIOSTAT
        assert!(combined.contains(SupportFlags::GPUSTAT));
    }
}
