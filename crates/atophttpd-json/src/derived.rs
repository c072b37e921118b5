/// CPU frequency and its percentage of `maxfreq`, from the raw
/// `(maxfreq, cnt, ticks)` triple sampled by the writer. See
/// SPEC_FULL.md §4.4 for the four cases.
pub fn freq_and_percent(maxfreq: u64, cnt: u64, ticks: u64) -> (u64, u64) {
    if maxfreq != 0 && ticks != 0 {
        let freq = cnt / ticks;
        (freq, 100 * freq / maxfreq)
    } else if ticks == 0 && maxfreq != 0 {
        (cnt, 100 * cnt / maxfreq)
    } else if maxfreq == 0 && cnt != 0 {
        (cnt, 100)
    } else {
        (0, 100)
    }
}

/// Maps the sentinel "all-ones" per-process memory value to `0`.
pub fn clean_pmem(pmem: u64) -> u64 {
    if pmem == u64::MAX {
        0
    } else {
        pmem
    }
}

/// Decoded process exit status: a two-character status string (leading
/// `N`/`-` flag, then `E`/`S`/`C`) and the numeric exit code.
pub fn exit_status(excode: i64) -> (String, i64) {
    // Killed-by-signal is decided on the full low byte, not just its
    // low 7 bits: an `excode` with bit 0x80 set but the rest zero must
    // still take this branch.
    let (second, exit) = if excode & 0xff != 0 {
        let low7 = excode & 0x7f;
        let core_dumped = excode & 0x80 != 0;
        (if core_dumped { 'C' } else { 'S' }, low7 + 256)
    } else {
        ('E', (excode >> 8) & 0xff)
    };

    let first = if excode > i32::MAX as i64 { 'N' } else { '-' };
    (format!("{first}{second}"), exit)
}

/// Replaces `"` and `\` with `#` so a task name/cmdline is JSON-safe.
pub fn clean_string(s: &str) -> String {
    s.chars()
        .map(|c| if c == '"' || c == '\\' { '#' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freq_both_nonzero() {
        assert_eq!(freq_and_percent(2000, 200, 10), (20, 1));
    }

    #[test]
    fn freq_ticks_zero() {
        assert_eq!(freq_and_percent(2000, 500, 0), (500, 25));
    }

    #[test]
    fn freq_maxfreq_zero() {
        assert_eq!(freq_and_percent(0, 5, 0), (5, 100));
    }

    #[test]
    fn freq_all_zero() {
        assert_eq!(freq_and_percent(0, 0, 0), (0, 100));
    }

    #[test]
    fn pmem_sentinel_becomes_zero() {
        assert_eq!(clean_pmem(u64::MAX), 0);
        assert_eq!(clean_pmem(42), 42);
    }

    #[test]
    fn clean_string_escapes_quotes_and_backslashes() {
        assert_eq!(clean_string(r#"a"b\c"#), "a#b#c");
    }

    #[test]
    fn exit_status_normal_exit() {
        let (status, exit) = exit_status(5 << 8);
        assert_eq!(status, "-E");
        assert_eq!(exit, 5);
    }

    #[test]
    fn exit_status_killed_by_signal() {
        let (status, exit) = exit_status(9);
        assert_eq!(status, "-S");
        assert_eq!(exit, 9 + 256);
    }

    #[test]
    fn exit_status_killed_with_core_dump() {
        let (status, exit) = exit_status(0x80 | 11);
        assert_eq!(status, "-C");
        assert_eq!(exit, 11 + 256);
    }

    #[test]
    fn exit_status_core_dump_bit_alone_still_takes_signal_branch() {
        // Low 7 bits are zero, but 0x80 is set: still "killed by
        // signal", core-dumped, signal number 0.
        let (status, exit) = exit_status(0x80);
        assert_eq!(status, "-C");
        assert_eq!(exit, 256);
    }

    #[test]
    fn exit_status_high_bit_flags_n() {
        let (status, _) = exit_status((i32::MAX as i64) + 1);
        assert_eq!(status.chars().next(), Some('N'));
    }
}
