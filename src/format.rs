//! Output format selection from the destination file name

use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The artifact kinds an export can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExportFormat {
    #[default]
    Html,
    Svg,
    Png,
    Pdf,
}

impl ExportFormat {
    /// Pick the format from `path`'s extension, case-insensitively. Missing or
    /// unrecognised extensions yield [`ExportFormat::Html`].
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or_default()
    }

    /// Whether producing this format needs a browser session
    pub fn needs_browser(self) -> bool {
        !matches!(self, ExportFormat::Html)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Svg => "svg",
            ExportFormat::Png => "png",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(ExportFormat::Html),
            "svg" => Ok(ExportFormat::Svg),
            "png" => Ok(ExportFormat::Png),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(ExportFormat::from_path("map.svg"), ExportFormat::Svg);
        assert_eq!(ExportFormat::from_path("out/map.PNG"), ExportFormat::Png);
        assert_eq!(ExportFormat::from_path("map.Pdf"), ExportFormat::Pdf);
        assert_eq!(ExportFormat::from_path("x.HTML"), ExportFormat::Html);
    }

    #[test]
    fn everything_else_is_html() {
        assert_eq!(ExportFormat::from_path("x"), ExportFormat::Html);
        assert_eq!(ExportFormat::from_path("x.unknown"), ExportFormat::Html);
        assert_eq!(ExportFormat::from_path(".svg"), ExportFormat::Html);
        assert_eq!(ExportFormat::from_path("dir.png/file"), ExportFormat::Html);
    }

    #[test]
    fn only_html_skips_the_browser() {
        assert!(!ExportFormat::Html.needs_browser());
        assert!(ExportFormat::Svg.needs_browser());
        assert!(ExportFormat::Png.needs_browser());
        assert!(ExportFormat::Pdf.needs_browser());
    }
}
