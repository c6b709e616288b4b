//! Static side-by-side comparison page.
//!
//! One card per manifest entry, in manifest order. Every interpolated
//! string is HTML-escaped. The page has no scripts and no external
//! assets so it can be opened straight from disk or served from a
//! bucket.

use std::fmt::{self, Write};

use magnify_pipeline::{Artifact, Manifest};

use crate::svg::xml_escape;

/// Where a card's image and link point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// Relative file names next to the page.
    Local,
    /// Uploaded URLs, falling back to the relative name when an entry
    /// has none.
    Remote,
}

/// Resolve the `src`/`href` of one entry.
#[must_use]
pub fn link_for(artifact: &Artifact, target: LinkTarget) -> &str {
    match (target, artifact.url.as_deref()) {
        (LinkTarget::Remote, Some(url)) if !url.is_empty() => url,
        _ => &artifact.file,
    }
}

const STYLE: &str = r#"      :root {
        --black: #0a0a0a;
        --white: #fafafa;
        --gray-200: #e8e8e8;
        --gray-600: #666;
        --gray-800: #333;
        --measure: 1100px;
      }
      * { box-sizing: border-box; }
      body {
        margin: 0;
        background: var(--white);
        color: var(--black);
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", "PingFang SC",
          "Hiragino Sans GB", "Microsoft YaHei", "Noto Sans CJK SC", sans-serif;
        line-height: 1.7;
        font-size: 15px;
      }
      a { color: inherit; }
      img { max-width: 100%; height: auto; display: block; }
      header {
        position: sticky;
        top: 0;
        background: rgba(250, 250, 250, 0.92);
        border-bottom: 1px solid var(--gray-200);
      }
      .wrap { max-width: var(--measure); margin: 0 auto; padding: 18px 20px; }
      .title {
        font-size: 12px;
        letter-spacing: 4px;
        text-transform: uppercase;
        color: var(--gray-600);
        font-weight: 650;
      }
      .subtitle { margin-top: 8px; color: var(--gray-800); font-size: 14px; }
      main { max-width: var(--measure); margin: 0 auto; padding: 18px 20px 60px; }
      .grid { display: grid; gap: 14px; grid-template-columns: repeat(2, minmax(0, 1fr)); }
      @media (max-width: 900px) { .grid { grid-template-columns: 1fr; } }
      .card { border: 1px solid var(--gray-200); background: rgba(245, 245, 245, 0.55); padding: 12px; }
      .imglink { display: block; border: 0; }
      figcaption { margin-top: 10px; display: grid; gap: 4px; }
      .label {
        font-size: 11px;
        letter-spacing: 3px;
        text-transform: uppercase;
        color: var(--gray-600);
        font-weight: 650;
      }
      .note { font-size: 13px; color: var(--gray-800); }
      footer {
        margin-top: 18px;
        padding-top: 14px;
        border-top: 1px solid var(--gray-200);
        color: var(--gray-600);
        font-size: 12px;
      }"#;

/// Render the comparison page for `manifest`.
///
/// `generated_at` is printed verbatim in the footer; the caller supplies
/// it so this function stays pure.
#[must_use]
pub fn compare_html(manifest: &Manifest, target: LinkTarget, generated_at: &str) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_page(&mut out, manifest, target, generated_at);
    out
}

fn write_page(
    out: &mut String,
    manifest: &Manifest,
    target: LinkTarget,
    generated_at: &str,
) -> fmt::Result {
    let title = xml_escape(&manifest.title);
    write!(
        out,
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <style>
{STYLE}
    </style>
  </head>
  <body>
    <header>
      <div class="wrap">
        <div class="title">{title}</div>
        <div class="subtitle">Click an image to open it full size in a new tab.</div>
      </div>
    </header>
    <main>
      <div class="grid">
"#
    )?;
    for item in &manifest.items {
        write_card(out, item, target)?;
    }
    write!(
        out,
        r"      </div>
      <footer>Generated by magnify · {generated}</footer>
    </main>
  </body>
</html>
",
        generated = xml_escape(generated_at),
    )
}

fn write_card(out: &mut String, item: &Artifact, target: LinkTarget) -> fmt::Result {
    let link = xml_escape(link_for(item, target));
    let label = xml_escape(&item.label);
    let note = xml_escape(&item.note);
    write!(
        out,
        r#"        <figure class="card">
          <a class="imglink" href="{link}" target="_blank" rel="noreferrer">
            <img src="{link}" alt="{label}" loading="lazy" />
          </a>
          <figcaption>
            <div class="label">{label}</div>
            <div class="note">{note}</div>
          </figcaption>
        </figure>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        let mut m = Manifest::new("Run <1>");
        m.push(Artifact::new("Original", "original.png", "100×50"));
        m.push(Artifact::new(
            "Traditional CLAHE+Unsharp ×8",
            "traditional_x8.png",
            "Fast baseline (no hallucinated detail)",
        ));
        m
    }

    #[test]
    fn cards_follow_manifest_order() {
        let page = compare_html(&manifest(), LinkTarget::Local, "2026-01-01T00:00:00");
        let a = page.find("original.png").unwrap_or(usize::MAX);
        let b = page.find("traditional_x8.png").unwrap_or(0);
        assert!(a < b);
        assert_eq!(page.matches(r#"<figure class="card">"#).count(), 2);
    }

    #[test]
    fn title_is_escaped() {
        let page = compare_html(&manifest(), LinkTarget::Local, "now");
        assert!(page.contains("<title>Run &lt;1&gt;</title>"));
        assert!(!page.contains("Run <1>"));
    }

    #[test]
    fn remote_links_fall_back_to_file() {
        let mut m = manifest();
        m.attach_url("original.png", "https://cdn.example/x/original.png");
        let page = compare_html(&m, LinkTarget::Remote, "now");
        assert!(page.contains(r#"src="https://cdn.example/x/original.png""#));
        assert!(page.contains(r#"src="traditional_x8.png""#));
    }

    #[test]
    fn local_links_ignore_urls() {
        let mut m = manifest();
        m.attach_url("original.png", "https://cdn.example/x/original.png");
        let page = compare_html(&m, LinkTarget::Local, "now");
        assert!(!page.contains("cdn.example"));
    }

    #[test]
    fn page_is_one_complete_document() {
        let page = compare_html(&manifest(), LinkTarget::Local, "<now>");
        assert!(page.starts_with("<!doctype html>\n<html lang=\"en\">\n"));
        assert!(page.ends_with("</html>\n"));
        assert_eq!(page.matches("<figure").count(), page.matches("</figure>").count());
        assert!(page.contains("<footer>Generated by magnify · &lt;now&gt;</footer>"));
        assert!(page.contains(r#"<div class="note">100×50</div>"#));
    }

    #[test]
    fn empty_url_is_treated_as_missing() {
        let mut artifact = Artifact::new("a", "a.png", "");
        artifact.url = Some(String::new());
        assert_eq!(link_for(&artifact, LinkTarget::Remote), "a.png");
    }
}
