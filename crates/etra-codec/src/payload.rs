use std::fmt;

use crate::data_uri::DataUri;

const VOICE_TAG: &str = "[VOICE:";
const IMAGE_TAG: &str = "[IMAGE:";
const FILE_TAG: &str = "[FILE:";
const CLOSE: char = ']';

/// Maximum characters of message text shown in a notification body.
const SUMMARY_CHARS: usize = 50;

/// Semantic content of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Plain text. Text that itself reads as a well-formed tag decodes as
    /// that tag, so only tag-free text survives `encode` then `decode`.
    Text(String),
    Voice { duration_secs: u32, data: String },
    Image { data: String },
    File { name: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("media data is empty")]
    EmptyData,
    #[error("file name is empty")]
    EmptyFileName,
    #[error("file name '{0}' contains ':' which the FILE tag cannot carry")]
    ColonInFileName(String),
    #[error("line terminators are not allowed inside a tagged payload")]
    LineTerminator,
}

impl Payload {
    /// Build a voice payload, validating that it survives a round trip.
    pub fn voice(duration_secs: u32, data: impl Into<String>) -> Result<Self, PayloadError> {
        let data = data.into();
        check_data(&data)?;
        Ok(Self::Voice {
            duration_secs,
            data,
        })
    }

    pub fn image(data: impl Into<String>) -> Result<Self, PayloadError> {
        let data = data.into();
        check_data(&data)?;
        Ok(Self::Image { data })
    }

    /// File names are embedded unescaped, so a name holding `:` would be
    /// split at the wrong place on decode and is rejected here.
    pub fn file(name: impl Into<String>, data: impl Into<String>) -> Result<Self, PayloadError> {
        let name = name.into();
        let data = data.into();
        if name.is_empty() {
            return Err(PayloadError::EmptyFileName);
        }
        if name.contains(':') {
            return Err(PayloadError::ColonInFileName(name));
        }
        if has_line_terminator(&name) {
            return Err(PayloadError::LineTerminator);
        }
        check_data(&data)?;
        Ok(Self::File { name, data })
    }

    /// Serialize into the single `content` field.
    ///
    /// Decoding the result gives back the same payload, except for `Text`
    /// holding something like `[IMAGE:x]`, which comes back as the tag.
    /// Text is stored verbatim and never escaped.
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Voice {
                duration_secs,
                data,
            } => format!("{VOICE_TAG}{duration_secs}:{data}{CLOSE}"),
            Self::Image { data } => format!("{IMAGE_TAG}{data}{CLOSE}"),
            Self::File { name, data } => format!("{FILE_TAG}{name}:{data}{CLOSE}"),
        }
    }

    /// Classify a `content` string. Never fails: anything that is not a
    /// well-formed tag is returned verbatim as text.
    pub fn decode(content: &str) -> Self {
        decode_voice(content)
            .or_else(|| decode_image(content))
            .or_else(|| decode_file(content))
            .unwrap_or_else(|| Self::Text(content.to_string()))
    }

    /// The inlined media, decoded. `None` for text and for data segments
    /// that are not base64 data URIs.
    pub fn media(&self) -> Option<DataUri> {
        match self {
            Self::Text(_) => None,
            Self::Voice { data, .. } | Self::Image { data } | Self::File { data, .. } => DataUri::parse(data),
        }
    }

    /// Short human-readable description, used as a notification body.
    pub fn summary(&self) -> String {
        match self {
            Self::Text(text) => text.chars().take(SUMMARY_CHARS).collect(),
            Self::Voice { .. } => "🎤 Voice message".to_string(),
            Self::Image { .. } => "📷 Image".to_string(),
            Self::File { name, .. } => format!("📎 {name}"),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn check_data(data: &str) -> Result<(), PayloadError> {
    if data.is_empty() {
        return Err(PayloadError::EmptyData);
    }
    if has_line_terminator(data) {
        return Err(PayloadError::LineTerminator);
    }
    Ok(())
}

fn has_line_terminator(s: &str) -> bool {
    s.contains(['\n', '\r', '\u{2028}', '\u{2029}'])
}

/// Strip `tag` and the closing bracket, returning what sits between them.
/// The match is anchored at both ends and the body may not span lines.
fn tag_body<'a>(content: &'a str, tag: &str) -> Option<&'a str> {
    let body = content.strip_prefix(tag)?.strip_suffix(CLOSE)?;
    if has_line_terminator(body) {
        return None;
    }
    Some(body)
}

fn decode_voice(content: &str) -> Option<Payload> {
    let body = tag_body(content, VOICE_TAG)?;
    let (digits, data) = body.split_once(':')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || data.is_empty() {
        return None;
    }
    let duration_secs = digits.parse().ok()?;
    Some(Payload::Voice {
        duration_secs,
        data: data.to_string(),
    })
}

fn decode_image(content: &str) -> Option<Payload> {
    let body = tag_body(content, IMAGE_TAG)?;
    if body.is_empty() {
        return None;
    }
    Some(Payload::Image {
        data: body.to_string(),
    })
}

fn decode_file(content: &str) -> Option<Payload> {
    let body = tag_body(content, FILE_TAG)?;
    // Shortest non-empty name followed by ':' and a non-empty remainder.
    let split = body
        .char_indices()
        .skip(1)
        .find(|&(i, c)| c == ':' && i + 1 < body.len())
        .map(|(i, _)| i)?;
    Some(Payload::File {
        name: body[..split].to_string(),
        data: body[split + 1..].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIO: &str = "data:audio/webm;base64,GkXfo59ChoEBQveBAULygQRC84EIQoKEd2VibUKHgQ";
    const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";
    const PDF: &str = "data:application/pdf;base64,JVBERi0xLjQK";

    #[test]
    fn roundtrip_each_kind() {
        let payloads = [
            Payload::voice(12, AUDIO).unwrap(),
            Payload::image(PNG).unwrap(),
            Payload::file("report.pdf", PDF).unwrap(),
            Payload::Text("hello".into()),
        ];
        for p in payloads {
            assert_eq!(Payload::decode(&p.encode()), p);
        }
    }

    #[test]
    fn text_that_reads_as_a_tag_does_not_round_trip() {
        let text = Payload::Text("[IMAGE:x]".into());
        assert_eq!(Payload::decode(&text.encode()), Payload::Image { data: "x".into() });
    }

    #[test]
    fn media_decodes_the_data_uri() {
        let voice = Payload::voice(2, "data:audio/webm;base64,GkXfow==").unwrap();
        let media = voice.media().unwrap();
        assert_eq!(media.mime, "audio/webm");
        assert_eq!(media.bytes, b"\x1a\x45\xdf\xa3");

        assert!(Payload::Text("hi".into()).media().is_none());
        assert!(Payload::image("https://example.com/a.png").unwrap().media().is_none());
    }

    #[test]
    fn encodes_literal_tags() {
        assert_eq!(
            Payload::voice(3, "data:x").unwrap().encode(),
            "[VOICE:3:data:x]"
        );
        assert_eq!(Payload::image("data:y").unwrap().encode(), "[IMAGE:data:y]");
        assert_eq!(
            Payload::file("a.txt", "data:z").unwrap().encode(),
            "[FILE:a.txt:data:z]"
        );
    }

    #[test]
    fn voice_wins_over_later_patterns() {
        let p = Payload::decode("[VOICE:0:x]");
        assert_eq!(
            p,
            Payload::Voice {
                duration_secs: 0,
                data: "x".into()
            }
        );
    }

    #[test]
    fn plain_text_with_brackets_stays_text() {
        for s in [
            "",
            "hello",
            "see [IMAGE:x] above",
            "[IMAGE:]",
            "[IMAGE:abc",
            "[VOICE:abc:data]",
            "[VOICE::data]",
            "[VOICE:12:]",
            "[VOICE:12]",
            "[FILE:name]",
            "[FILE:a:]",
            "[FILE::]",
            "[image:data]",
            " [IMAGE:data]",
            "[IMAGE:data] ",
            "[IMAGE:line\nbreak]",
        ] {
            assert_eq!(Payload::decode(s), Payload::Text(s.to_string()), "{s:?}");
        }
    }

    #[test]
    fn voice_duration_overflow_degrades_to_text() {
        let s = "[VOICE:99999999999:data]";
        assert_eq!(Payload::decode(s), Payload::Text(s.into()));
    }

    #[test]
    fn file_name_splits_at_first_colon() {
        // Data URIs carry ':' themselves; the name ends at the first one.
        assert_eq!(
            Payload::decode("[FILE:notes.txt:data:text/plain;base64,aGk=]"),
            Payload::File {
                name: "notes.txt".into(),
                data: "data:text/plain;base64,aGk=".into()
            }
        );
        // A leading ':' is consumed by the non-empty name.
        assert_eq!(
            Payload::decode("[FILE:::x]"),
            Payload::File {
                name: ":".into(),
                data: "x".into()
            }
        );
    }

    #[test]
    fn colon_in_file_name_is_rejected() {
        assert_eq!(
            Payload::file("a:b.txt", PDF),
            Err(PayloadError::ColonInFileName("a:b.txt".into()))
        );
        assert_eq!(Payload::file("", PDF), Err(PayloadError::EmptyFileName));
        assert_eq!(Payload::image(""), Err(PayloadError::EmptyData));
    }

    #[test]
    fn data_may_contain_closing_brackets() {
        let p = Payload::decode("[IMAGE:a]b]");
        assert_eq!(p, Payload::Image { data: "a]b".into() });
    }

    #[test]
    fn summaries() {
        assert_eq!(Payload::voice(1, "d").unwrap().summary(), "🎤 Voice message");
        assert_eq!(Payload::file("cv.pdf", "d").unwrap().summary(), "📎 cv.pdf");
        let long = "x".repeat(80);
        assert_eq!(Payload::Text(long).summary().len(), 50);
        assert_eq!(Payload::Text("مرحبا".into()).summary(), "مرحبا");
    }
}
