/// Fixed label table, in emission order -- not selector order.
pub const LABEL_ORDER: &[&str] = &[
    "CPU", "cpu", "CPL", "GPU", "MEM", "SWP", "PAG", "PSI", "LVM", "MDD", "DSK", "NFM", "NFC",
    "NFS", "NET", "IFB", "NUM", "NUC", "LLC", "PRG", "PRC", "PRM", "PRD", "PRN", "PRE",
];

/// Parses a comma-separated selector (or the literal `"ALL"`) into the
/// subset of known labels that were requested, preserving no particular
/// order (the emitter always walks `LABEL_ORDER`). Returns the first
/// unknown label encountered as an error, matching the source's
/// fail-the-whole-request behaviour.
pub fn parse_selector(selector: &str) -> Result<Vec<&'static str>, String> {
    if selector.is_empty() || selector.starts_with('-') {
        return Err(selector.to_string());
    }

    if selector == "ALL" {
        return Ok(LABEL_ORDER.to_vec());
    }

    let mut selected = Vec::new();
    for raw in selector.split(',') {
        match LABEL_ORDER.iter().find(|&&l| l == raw) {
            Some(&label) => selected.push(label),
            None => return Err(raw.to_string()),
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_every_label_in_table_order() {
        let selected = parse_selector("ALL").unwrap();
        assert_eq!(selected, LABEL_ORDER);
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert_eq!(parse_selector("CPU,FOO").unwrap_err(), "FOO");
    }

    #[test]
    fn empty_selector_is_rejected() {
        assert!(parse_selector("").is_err());
    }
}
