//! HLS playlist finalization (§6): rewrites a live playlist into its VOD or
//! EVENT form. Pure string transforms, grounded in the pack's
//! `raibu-stream-hls-playlist` line-oriented playlist handling, kept
//! idempotent so re-finalization (e.g. a retried publish) is harmless
//! (property 8 of §8).

const EXTM3U: &str = "#EXTM3U";
const DISCONTINUITY: &str = "#EXT-X-DISCONTINUITY";
const PLAYLIST_TYPE_PREFIX: &str = "#EXT-X-PLAYLIST-TYPE:";
const ENDLIST: &str = "#EXT-X-ENDLIST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Vod,
    Event,
}

impl PlaylistKind {
    fn tag(self) -> &'static str {
        match self {
            PlaylistKind::Vod => "VOD",
            PlaylistKind::Event => "EVENT",
        }
    }
}

/// Rewrites a live playlist's text into its VOD or EVENT form:
/// - drops every `#EXT-X-DISCONTINUITY` line
/// - drops any existing `#EXT-X-PLAYLIST-TYPE` line
/// - inserts `#EXT-X-PLAYLIST-TYPE:<kind>` immediately after `#EXTM3U`
/// - appends `#EXT-X-ENDLIST` for VOD only, and only if not already present
///
/// Idempotent: finalizing an already-finalized playlist of the same kind
/// yields byte-identical output.
pub fn finalize(source: &str, kind: PlaylistKind) -> String {
    let mut out_lines: Vec<&str> = Vec::new();
    let mut inserted_type = false;
    let mut has_endlist = false;

    for line in source.lines() {
        let trimmed = line.trim_end();
        if trimmed == DISCONTINUITY {
            continue;
        }
        if trimmed.starts_with(PLAYLIST_TYPE_PREFIX) {
            continue;
        }
        if trimmed == ENDLIST {
            has_endlist = true;
            continue;
        }
        out_lines.push(trimmed);
        if !inserted_type && trimmed == EXTM3U {
            inserted_type = true;
        }
    }

    let type_line = format!("{PLAYLIST_TYPE_PREFIX}{}", kind.tag());
    let mut result = String::with_capacity(source.len() + 64);
    let mut type_line_written = false;
    for line in &out_lines {
        result.push_str(line);
        result.push('\n');
        if !type_line_written && *line == EXTM3U {
            result.push_str(&type_line);
            result.push('\n');
            type_line_written = true;
        }
    }
    if !type_line_written {
        // No #EXTM3U header found; prepend the required tags defensively.
        result = format!("{EXTM3U}\n{type_line}\n{result}");
    }

    if kind == PlaylistKind::Vod {
        let _ = has_endlist;
        result.push_str(ENDLIST);
        result.push('\n');
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: &str = "#EXTM3U\n#EXT-X-VERSION:7\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-DISCONTINUITY\n#EXTINF:6.000,\nseg_00000.m4s\n#EXTINF:6.000,\nseg_00001.m4s\n";

    #[test]
    fn vod_finalization_strips_discontinuity_and_appends_endlist() {
        let out = finalize(LIVE, PlaylistKind::Vod);
        assert!(!out.contains(DISCONTINUITY));
        assert!(out.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(out.trim_end().ends_with(ENDLIST));
    }

    #[test]
    fn event_finalization_omits_endlist() {
        let out = finalize(LIVE, PlaylistKind::Event);
        assert!(out.contains("#EXT-X-PLAYLIST-TYPE:EVENT"));
        assert!(!out.contains(ENDLIST));
    }

    #[test]
    fn playlist_type_is_inserted_right_after_header() {
        let out = finalize(LIVE, PlaylistKind::Vod);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], EXTM3U);
        assert_eq!(lines[1], "#EXT-X-PLAYLIST-TYPE:VOD");
    }

    #[test]
    fn finalization_is_idempotent() {
        let once = finalize(LIVE, PlaylistKind::Vod);
        let twice = finalize(&once, PlaylistKind::Vod);
        assert_eq!(once, twice);
    }

    #[test]
    fn existing_playlist_type_is_replaced_not_duplicated() {
        let already_event = finalize(LIVE, PlaylistKind::Event);
        let as_vod = finalize(&already_event, PlaylistKind::Vod);
        assert_eq!(as_vod.matches("#EXT-X-PLAYLIST-TYPE").count(), 1);
        assert!(as_vod.contains("VOD"));
    }
}
