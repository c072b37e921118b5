//! Process-wide state, constructed once in `main` and threaded through
//! the HTTP front explicitly (SPEC_FULL.md §9: "pass them as an
//! explicit context object" rather than rely on implicit globals).

use std::time::Instant;

use atophttpd_rawlog::RawlogEngine;

pub struct AtopHttpd {
    pub engine: RawlogEngine,
    pub hide_cmdline: bool,
    pub hostname: String,
    pub last_scan: Instant,
}

impl AtopHttpd {
    pub fn new(log_dir: impl Into<std::path::PathBuf>, hide_cmdline: bool) -> Self {
        AtopHttpd {
            engine: RawlogEngine::new(log_dir),
            hide_cmdline,
            hostname: hostname(),
            last_scan: Instant::now(),
        }
    }
}

fn hostname() -> String {
    let mut buf = vec![0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}
