//! Character encoding detection.
//!
//! Older books, particularly ones converted from plain-text sources, often
//! ship chapters in a legacy encoding with no declaration at all. Detection
//! resolves in three steps:
//!
//! 1. a charset declared in the document's markup,
//! 2. statistical detection over a sample of the raw bytes,
//! 3. UTF-8.
//!
//! None of these steps can fail; an unrecognized label or an inconclusive
//! sample falls through to the next step.

use std::borrow::Cow;

use encoding_rs::{
    BIG5, EUC_JP, EUC_KR, Encoding, GB18030, SHIFT_JIS, UTF_8, WINDOWS_1251, WINDOWS_1252,
};
use log::{debug, warn};
use memchr::memmem;

use crate::dom::parse_markup;
use crate::epub::Document;

/// Bytes of the sample fed to statistical detection.
const SAMPLE_LIMIT: usize = 8 * 1024;

/// Bytes searched for an XML declaration.
const XML_DECL_LIMIT: usize = 1024;

/// Spine units inspected when the lead unit carries no non-ASCII text.
const MAX_SAMPLE_UNITS: usize = 5;

/// Lowest score a legacy candidate needs to be chosen.
const MIN_CONFIDENCE: f32 = 0.5;

/// A legacy encoding considered by statistical detection.
struct Candidate {
    encoding: &'static Encoding,
    /// Characters of the script this encoding exists to carry.
    script: fn(char) -> bool,
    /// The most frequent characters of that script in running text.
    common: &'static str,
}

/// Candidates in priority order. Ties go to the earlier entry.
fn candidates() -> [Candidate; 7] {
    [
        Candidate {
            encoding: GB18030,
            script: is_chinese,
            common: "的一是了不在人有我他这中大来上个们到说和地也就你要会对着出以，。、“”",
        },
        Candidate {
            encoding: BIG5,
            script: is_chinese,
            common: "的一是了不在人有我他這中大來上個們到說和地也就你要會對著出以，。、「」",
        },
        Candidate {
            encoding: SHIFT_JIS,
            script: is_japanese,
            common: "のにはをたがでてとしいるなかっすま、。「」",
        },
        Candidate {
            encoding: EUC_JP,
            script: is_japanese,
            common: "のにはをたがでてとしいるなかっすま、。「」",
        },
        Candidate {
            encoding: EUC_KR,
            script: is_korean,
            common: "이의다는에가을하고지로기서한들리사인어",
        },
        Candidate {
            encoding: WINDOWS_1251,
            script: is_cyrillic,
            common: "оеаинтсрвл",
        },
        Candidate {
            encoding: WINDOWS_1252,
            script: is_latin1,
            common: "éèàçüöäßñáóí",
        },
    ]
}

/// Guess the encoding of `sample`.
///
/// A `metadata_hint` naming a label `encoding_rs` recognizes is used as is,
/// except that a UTF-8 label is ignored when the sample is not valid UTF-8.
pub fn detect(metadata_hint: Option<&str>, sample: &[u8]) -> &'static Encoding {
    if let Some(label) = metadata_hint {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) if encoding == UTF_8 && !is_utf8(sample) => {
                debug!("declared charset {label} does not match the bytes, detecting");
            }
            Some(encoding) => return encoding,
            None => debug!("unrecognized charset label {label:?}"),
        }
    }

    detect_statistically(sample).unwrap_or(UTF_8)
}

/// Statistical detection alone. `None` when the sample is inconclusive.
fn detect_statistically(sample: &[u8]) -> Option<&'static Encoding> {
    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        return Some(encoding);
    }

    let sample = cut_sample(sample);
    if is_utf8(sample) {
        return Some(UTF_8);
    }

    let mut best: Option<(&'static Encoding, f32)> = None;
    for candidate in &candidates() {
        let Some(text) = candidate
            .encoding
            .decode_without_bom_handling_and_without_replacement(sample)
        else {
            continue;
        };
        let Some(score) = score(candidate, &text) else {
            continue;
        };
        debug!("{} scored {score:.2}", candidate.encoding.name());
        if score >= MIN_CONFIDENCE && best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate.encoding, score));
        }
    }

    best.map(|(encoding, _)| encoding)
}

/// Limit the sample to [`SAMPLE_LIMIT`] bytes, cutting at a line or tag
/// boundary so no multi-byte sequence is split.
fn cut_sample(sample: &[u8]) -> &[u8] {
    if sample.len() <= SAMPLE_LIMIT {
        return sample;
    }
    let head = &sample[..SAMPLE_LIMIT];
    match memchr::memrchr2(b'\n', b'<', head) {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    }
}

/// Valid UTF-8, allowing a sequence truncated at the very end.
fn is_utf8(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Score decoded text against a candidate, or `None` when it has no
/// non-ASCII characters to judge by.
///
/// Half the score is the share of non-ASCII characters in the candidate's
/// script, the other half the share that are among its most common
/// characters.
fn score(candidate: &Candidate, text: &str) -> Option<f32> {
    let mut total = 0u32;
    let mut in_script = 0u32;
    let mut common = 0u32;

    for c in text.chars().filter(|c| !c.is_ascii()) {
        total += 1;
        if (candidate.script)(c) {
            in_script += 1;
        }
        if candidate.common.contains(c) {
            common += 1;
        }
    }

    (total > 0).then(|| 0.5 * (in_script as f32 / total as f32) + 0.5 * (common as f32 / total as f32))
}

fn is_han(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

/// CJK symbols, full- and half-width forms, and curly quotes.
fn is_cjk_punct(c: char) -> bool {
    matches!(
        c,
        '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FFEF}' | '\u{2018}'..='\u{201D}' | '\u{2026}'
    )
}

fn is_chinese(c: char) -> bool {
    is_han(c) || is_cjk_punct(c)
}

fn is_japanese(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{30FF}') || is_chinese(c)
}

fn is_korean(c: char) -> bool {
    matches!(
        c,
        '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}'
    ) || is_chinese(c)
}

/// Typographic punctuation found in the 0x80-0x9F range of Windows code pages.
fn is_windows_punct(c: char) -> bool {
    matches!(c, '\u{2013}'..='\u{2026}' | '\u{20AC}' | '\u{00A0}'..='\u{00BF}')
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}') || is_windows_punct(c)
}

fn is_latin1(c: char) -> bool {
    (matches!(c, '\u{00C0}'..='\u{00FF}') && c != '×' && c != '÷')
        || matches!(c, 'Œ' | 'œ' | 'Š' | 'š' | 'Ž' | 'ž' | 'Ÿ')
        || is_windows_punct(c)
}

/// Extract the charset declared by a markup document.
///
/// Looks, in order, for a `<meta charset>` attribute, a
/// `<meta http-equiv="Content-Type" content="...; charset=...">` value, and
/// an XML declaration's `encoding` pseudo-attribute. The markup is read as
/// UTF-8 for the search; a legacy encoding does not affect the ASCII
/// declarations.
pub fn charset_hint(markup: &[u8]) -> Option<String> {
    let dom = parse_markup(&String::from_utf8_lossy(markup));
    let metas: Vec<_> = dom.elements_by_tag("meta").collect();

    let declared = metas
        .iter()
        .filter_map(|&meta| dom.get_attr(meta, "charset"))
        .map(str::trim)
        .find(|charset| !charset.is_empty());
    if let Some(charset) = declared {
        return Some(charset.to_string());
    }

    let http_equiv = metas.iter().find_map(|&meta| {
        let is_content_type = dom
            .get_attr(meta, "http-equiv")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-type"));
        if !is_content_type {
            return None;
        }
        dom.get_attr(meta, "content").and_then(charset_from_content_type)
    });
    if http_equiv.is_some() {
        return http_equiv;
    }

    xml_declared_encoding(markup)
}

/// `text/html; charset=gbk` → `gbk`
fn charset_from_content_type(content: &str) -> Option<String> {
    content.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn xml_declared_encoding(markup: &[u8]) -> Option<String> {
    let head = &markup[..markup.len().min(XML_DECL_LIMIT)];
    let start = memmem::find(head, b"<?xml")?;
    let decl = &head[start..];
    let decl = &decl[..memmem::find(decl, b"?>")?];

    let after = &decl[memmem::find(decl, b"encoding")? + b"encoding".len()..];
    let after = after.trim_ascii_start().strip_prefix(b"=")?.trim_ascii_start();
    let (&quote, rest) = after.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let end = memchr::memchr(quote, rest)?;
    let label = std::str::from_utf8(&rest[..end]).ok()?.trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// Resolve the text encoding of a whole document.
///
/// The lead unit is inspected first. When it declares no legacy charset and
/// carries no non-ASCII bytes (an image-only cover, say) the following spine
/// units are sampled instead. A document whose units cannot be read resolves to
/// UTF-8.
pub fn resolve_encoding(document: &Document) -> &'static Encoding {
    let Some(lead) = document.lead_unit() else {
        return UTF_8;
    };
    let rest = document.units().filter(|unit| unit.index() != lead.index());

    for unit in std::iter::once(lead).chain(rest).take(MAX_SAMPLE_UNITS) {
        let bytes = match unit.data() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cannot sample {} for charset detection: {e}", unit.href());
                continue;
            }
        };

        // An ASCII unit declaring UTF-8 is inconclusive.
        let hint = charset_hint(&bytes);
        let declared_legacy = hint
            .as_deref()
            .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
            .is_some_and(|encoding| encoding != UTF_8);
        if declared_legacy || !bytes.is_ascii() {
            let encoding = detect(hint.as_deref(), &bytes);
            debug!("resolved {} from {}", encoding.name(), unit.href());
            return encoding;
        }
    }

    UTF_8
}

/// Decode unit markup with the document encoding.
///
/// A byte-order mark overrides `encoding`. Malformed sequences are replaced
/// with U+FFFD.
pub fn decode_markup<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    let (text, actual, malformed) = encoding.decode(bytes);
    if malformed {
        debug!("malformed {} sequences replaced", actual.name());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html(body: &str) -> String {
        format!("<html><head><title>t</title></head><body>{body}</body></html>")
    }

    fn encode(encoding: &'static Encoding, text: &str) -> Vec<u8> {
        let (bytes, _, unmappable) = encoding.encode(text);
        assert!(!unmappable, "test text must be representable");
        bytes.into_owned()
    }

    #[test]
    fn test_ascii_and_utf8_are_utf8() {
        assert_eq!(detect(None, b"plain ascii"), UTF_8);
        assert_eq!(detect(None, "日本語のテキスト".as_bytes()), UTF_8);
        assert_eq!(detect(None, b""), UTF_8);
    }

    #[test]
    fn test_bom_wins() {
        assert_eq!(detect(None, b"\xFF\xFEh\x00i\x00"), encoding_rs::UTF_16LE);
        assert_eq!(detect(None, b"\xFE\xFF\x00h\x00i"), encoding_rs::UTF_16BE);
        assert_eq!(detect(None, b"\xEF\xBB\xBFhi"), UTF_8);
    }

    #[test]
    fn test_detects_gbk() {
        let text = html("<p>我们的生活中有很多美好的事情，他说这是一个大家都知道的道理。</p>");
        let bytes = encode(encoding_rs::GBK, &text);
        assert_eq!(detect(None, &bytes), GB18030);
    }

    #[test]
    fn test_detects_big5() {
        let text = html("<p>我們的生活中有很多美好的事情，他說這是一個大家都知道的道理。</p>");
        let bytes = encode(BIG5, &text);
        assert_eq!(detect(None, &bytes), BIG5);
    }

    #[test]
    fn test_detects_shift_jis() {
        let text = html("<p>これは日本語の文章です。私はそれを読むのが好きです。</p>");
        let bytes = encode(SHIFT_JIS, &text);
        assert_eq!(detect(None, &bytes), SHIFT_JIS);
    }

    #[test]
    fn test_detects_windows_1251() {
        let text = html("<p>Привет, как дела? Это обычный русский текст о жизни.</p>");
        let bytes = encode(WINDOWS_1251, &text);
        assert_eq!(detect(None, &bytes), WINDOWS_1251);
    }

    #[test]
    fn test_detects_windows_1252() {
        let text = html("<p>Le garçon était très fatigué après la journée à l'école.</p>");
        let bytes = encode(WINDOWS_1252, &text);
        assert_eq!(detect(None, &bytes), WINDOWS_1252);
    }

    #[test]
    fn test_hint_wins_over_statistics() {
        let bytes = encode(encoding_rs::GBK, &html("<p>我们的生活</p>"));
        assert_eq!(detect(Some("Shift_JIS"), &bytes), SHIFT_JIS);
        assert_eq!(detect(Some(" gbk "), &bytes), encoding_rs::GBK);
    }

    #[test]
    fn test_bad_hints_fall_through() {
        let bytes = encode(
            encoding_rs::GBK,
            &html("<p>我们的生活中有很多美好的事情，他说这是一个大家都知道的道理。</p>"),
        );
        assert_eq!(detect(Some("no-such-charset"), &bytes), GB18030);
        // A UTF-8 declaration that the bytes contradict is not trusted.
        assert_eq!(detect(Some("utf-8"), &bytes), GB18030);
        assert_eq!(detect(Some("utf-8"), "中文".as_bytes()), UTF_8);
    }

    #[test]
    fn test_inconclusive_sample_defaults_to_utf8() {
        // Lone high bytes are malformed in every multi-byte candidate and
        // decode to symbols in the single-byte ones.
        assert_eq!(detect(None, b"\x80 \x86 \x87 \x89"), UTF_8);
    }

    #[test]
    fn test_cut_sample_at_boundary() {
        let mut sample = vec![b'a'; SAMPLE_LIMIT - 10];
        sample.push(b'<');
        sample.extend(std::iter::repeat_n(0xB0, 100));
        let cut = cut_sample(&sample);
        assert_eq!(cut.len(), SAMPLE_LIMIT - 10);

        let short = b"short<p>";
        assert_eq!(cut_sample(short), short);
    }

    #[test]
    fn test_charset_hint_meta_charset() {
        let markup = br#"<html><head><meta charset="GBK"/></head><body/></html>"#;
        assert_eq!(charset_hint(markup).as_deref(), Some("GBK"));
    }

    #[test]
    fn test_charset_hint_http_equiv() {
        let markup = br#"<html><head>
<meta http-equiv="Content-Type" content="text/html; charset=big5"/>
</head><body/></html>"#;
        assert_eq!(charset_hint(markup).as_deref(), Some("big5"));
    }

    #[test]
    fn test_charset_hint_xml_declaration() {
        let markup = br#"<?xml version="1.0" encoding='Shift_JIS'?><html><body/></html>"#;
        assert_eq!(charset_hint(markup).as_deref(), Some("Shift_JIS"));
    }

    #[test]
    fn test_meta_charset_beats_xml_declaration() {
        let markup = br#"<?xml version="1.0" encoding="utf-8"?>
<html><head><meta charset="gb2312"/></head><body/></html>"#;
        assert_eq!(charset_hint(markup).as_deref(), Some("gb2312"));
    }

    #[test]
    fn test_charset_hint_absent() {
        assert_eq!(charset_hint(b"<html><body><p>x</p></body></html>"), None);
    }

    #[test]
    fn test_decode_markup_replaces_malformed() {
        assert_eq!(decode_markup(b"ok\xFF", UTF_8), "ok\u{FFFD}");
        let bytes = encode(encoding_rs::GBK, "中文");
        assert_eq!(decode_markup(&bytes, GB18030), "中文");
    }
}
