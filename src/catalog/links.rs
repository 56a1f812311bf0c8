//! Parsing of catalog share links, URIs and bare ids

use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Track,
    Album,
    Playlist,
    Artist,
    Episode,
    Show,
}

impl LinkKind {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            "playlist" => Some(Self::Playlist),
            "artist" => Some(Self::Artist),
            "episode" => Some(Self::Episode),
            "show" => Some(Self::Show),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Artist => "artist",
            Self::Episode => "episode",
            Self::Show => "show",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog object named by a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLink {
    pub kind: LinkKind,
    pub id: String,
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parse a share URL (`https://host/[intl-xx/]album/{id}`), a URI
/// (`scheme:album:{id}`) or a bare track id
pub fn parse_link(input: &str) -> Option<CatalogLink> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if input.contains("://") {
        let url = Url::parse(input).ok()?;
        let segments: Vec<&str> = url
            .path_segments()?
            .filter(|s| !s.is_empty() && !s.starts_with("intl-") && *s != "embed")
            .collect();
        return segments.windows(2).find_map(|pair| {
            let kind = LinkKind::from_segment(pair[0])?;
            valid_id(pair[1]).then(|| CatalogLink {
                kind,
                id: pair[1].to_string(),
            })
        });
    }

    let parts: Vec<&str> = input.split(':').collect();
    match parts.as_slice() {
        [_, kind, id] => {
            let kind = LinkKind::from_segment(kind)?;
            valid_id(id).then(|| CatalogLink {
                kind,
                id: id.to_string(),
            })
        }
        [id] if valid_id(id) => Some(CatalogLink {
            kind: LinkKind::Track,
            id: id.to_string(),
        }),
        _ => None,
    }
}

/// Parse a links file: one link per line, blank lines ignored
///
/// Returns the parsed links and the lines that could not be parsed.
pub fn parse_links_file(contents: &str) -> (Vec<CatalogLink>, Vec<String>) {
    let mut links = Vec::new();
    let mut rejected = Vec::new();
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_link(line) {
            Some(link) => links.push(link),
            None => rejected.push(line.to_string()),
        }
    }
    (links, rejected)
}
