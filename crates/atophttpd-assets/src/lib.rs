//! Static assets embedded into the `atophttpd` binary at compile time,
//! following the `#[derive(RustEmbed)]` pattern used elsewhere in the
//! example pack for serving a bundled web UI (`jburrow-fast_code_search`'s
//! `web::StaticAssets`) rather than reading files from disk at runtime.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "web/"]
struct Web;

/// Looks up an embedded asset by its path relative to `web/`, returning
/// the bytes and a guessed MIME type. Returns `None` for the routes in
/// SPEC_FULL.md §4.6 that aren't literal file paths (`index.html`
/// served for the empty path, `ping` handled by the HTTP front itself).
pub fn lookup(path: &str) -> Option<(std::borrow::Cow<'static, [u8]>, mime_guess::Mime)> {
    let file = Web::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Some((file.data, mime))
}

pub fn index_html() -> std::borrow::Cow<'static, [u8]> {
    Web::get("index.html").expect("index.html must be embedded").data
}

pub fn help_html() -> std::borrow::Cow<'static, [u8]> {
    Web::get("help.html").expect("help.html must be embedded").data
}

pub fn favicon() -> std::borrow::Cow<'static, [u8]> {
    Web::get("favicon.ico")
        .expect("favicon.ico must be embedded")
        .data
}

/// Serves one of the four parameterised templates named in
/// SPEC_FULL.md §4.6 (`generic`, `memory`, `disk`, `command_line`).
pub fn template(kind: &str) -> Option<std::borrow::Cow<'static, [u8]>> {
    let path = format!("template_{kind}.html");
    Web::get(&path).map(|f| f.data)
}

pub fn template_header() -> std::borrow::Cow<'static, [u8]> {
    Web::get("template_header.html")
        .expect("template_header.html must be embedded")
        .data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_routed_assets_are_embedded() {
        for path in [
            "index.html",
            "help.html",
            "favicon.ico",
            "js/atop.js",
            "js/atop_parse.js",
            "js/atop_compare_fc.js",
            "css/atop.css",
            "template_header.html",
            "template_generic.html",
            "template_memory.html",
            "template_disk.html",
            "template_command_line.html",
        ] {
            assert!(Web::get(path).is_some(), "missing embedded asset {path}");
        }
    }

    #[test]
    fn lookup_guesses_javascript_mime_type() {
        let (_, mime) = lookup("js/atop.js").unwrap();
        assert_eq!(mime.essence_str(), "application/javascript");
    }

    #[test]
    fn lookup_returns_none_for_unknown_path() {
        assert!(lookup("does/not/exist").is_none());
    }

    #[test]
    fn template_rejects_unknown_kind() {
        assert!(template("bogus").is_none());
        assert!(template("memory").is_some());
    }
}
