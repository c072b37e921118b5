//! Fixture-building helpers shared by this crate's unit tests and the
//! `atophttpd` binary's integration tests. Since no real rawlog writer
//! is part of this port (see SPEC_FULL.md §1, out of scope), tests
//! synthesize log files with this crate's own encoder.

use std::fs;
use std::io::Write;
use std::path::Path;

use zerocopy::{AsBytes, FromZeroes};

use crate::codec::compress;
use crate::header::{RawHeader, RawRecord, AVERSION};
use crate::stat::{Sstat, Tstat};

/// Writes a minimal valid rawlog file containing one record per entry
/// in `times`, each carrying an empty `Sstat` and an empty task array.
/// An empty `times` produces a header-only file.
pub fn write_fixture_log(path: &Path, times: &[i64]) {
    let mut header = RawHeader::new_zeroed();
    header.magic.set(crate::header::MYMAGIC);
    header.aversion.set(AVERSION);
    header.rawheadlen.set(RawHeader::SIZE as u32);
    header.rawreclen.set(RawRecord::SIZE as u32);
    header.sstatlen.set(0);
    header.tstatlen.set(0);
    header.supportflags.set(0);

    let mut file = fs::File::create(path).expect("create fixture log file");
    file.write_all(header.as_bytes()).unwrap();

    for &t in times {
        let sstat = Sstat::default();
        let tasks: Vec<Tstat> = Vec::new();

        let sstat_bytes = bincode::serialize(&sstat).unwrap();
        let tstat_bytes = bincode::serialize(&tasks).unwrap();
        let scomp = compress(&sstat_bytes).unwrap();
        let pcomp = compress(&tstat_bytes).unwrap();

        let mut rec = RawRecord::new_zeroed();
        rec.curtime.set(t as u64);
        rec.interval.set(10);
        rec.scomplen.set(scomp.len() as u32);
        rec.pcomplen.set(pcomp.len() as u32);
        rec.ndeviat.set(0);

        file.write_all(rec.as_bytes()).unwrap();
        file.write_all(&scomp).unwrap();
        file.write_all(&pcomp).unwrap();
    }
}
