//! Chapter table, encoding and extraction tests over whole documents.

mod common;

use common::{EpubBuilder, three_unit_book, xhtml};
use folio::{
    BuildError, Document, ExtractError, WebTextFormatter, build_chapter_table, extract_chapter_text,
    resolve_encoding,
};

fn gbk(text: &str) -> Vec<u8> {
    let (bytes, _, unmappable) = encoding_rs::GBK.encode(text);
    assert!(!unmappable);
    bytes.into_owned()
}

/// GBK chapter markup with no charset declaration anywhere.
fn gbk_chapter(title: &str, body: &str) -> Vec<u8> {
    gbk(&format!(
        "<html><head><title>{title}</title></head><body>{body}</body></html>"
    ))
}

// ============================================================================
// Chapter table
// ============================================================================

#[test]
fn test_three_unit_example() {
    let doc = Document::from_bytes(three_unit_book().build()).unwrap();
    let encoding = resolve_encoding(&doc);
    assert_eq!(encoding, encoding_rs::UTF_8);

    let table = build_chapter_table(&doc, encoding, "Cover").unwrap();
    let entries: Vec<_> = table
        .iter()
        .map(|e| (e.index, e.title.as_str()))
        .collect();
    assert_eq!(entries, vec![(0, "Cover"), (1, "Chapter One"), (2, "")]);
    assert_eq!(table.get(1).unwrap().source_ref, "OEBPS/Text/chapter1.xhtml");

    let unit1 = doc.unit(1).unwrap();
    assert_eq!(
        extract_chapter_text(&unit1, encoding, &WebTextFormatter).unwrap(),
        "\u{3000}\u{3000}Hello\r\n\u{3000}\u{3000}World"
    );

    let unit2 = doc.unit(2).unwrap();
    assert_eq!(extract_chapter_text(&unit2, encoding, &WebTextFormatter).unwrap(), "");
}

#[test]
fn test_indices_match_spine_order() {
    let mut book = EpubBuilder::new();
    for i in 0..12 {
        book = book.unit(
            &format!("u{i}"),
            &format!("Text/u{i}.xhtml"),
            &xhtml(Some(&format!("Part {i}")), "<p>text</p>"),
        );
    }
    let doc = Document::from_bytes(book.build()).unwrap();
    let table = build_chapter_table(&doc, encoding_rs::UTF_8, "Cover").unwrap();

    assert_eq!(table.len(), 12);
    for (position, entry) in table.iter().enumerate() {
        assert_eq!(entry.index, position);
        assert_eq!(entry.source_ref, format!("OEBPS/Text/u{position}.xhtml"));
        if position > 0 {
            assert_eq!(entry.title, format!("Part {position}"));
        }
    }
}

#[test]
fn test_empty_spine_is_an_error() {
    let doc = Document::from_bytes(EpubBuilder::new().build()).unwrap();
    let err = build_chapter_table(&doc, encoding_rs::UTF_8, "Cover").unwrap_err();
    assert_eq!(err, BuildError::Empty);
}

#[test]
fn test_lead_label_overrides_title() {
    let book = EpubBuilder::new()
        .unit("only", "only.xhtml", &xhtml(Some("A Real Title"), "<p>x</p>"));
    let doc = Document::from_bytes(book.build()).unwrap();

    let table = build_chapter_table(&doc, encoding_rs::UTF_8, "封面").unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0).unwrap().title, "封面");
}

#[test]
fn test_titles_are_whitespace_collapsed() {
    let book = three_unit_book().unit(
        "c3",
        "Text/chapter3.xhtml",
        &xhtml(Some("\n   Chapter\n\t  Three  "), "<p>x</p>"),
    );
    let doc = Document::from_bytes(book.build()).unwrap();
    let table = build_chapter_table(&doc, encoding_rs::UTF_8, "Cover").unwrap();
    assert_eq!(table.get(3).unwrap().title, "Chapter Three");
}

#[test]
fn test_self_closing_head_elements() {
    let book = three_unit_book()
        .unit(
            "c3",
            "Text/chapter3.xhtml",
            &xhtml(None, "<p>Hello</p><p>World</p>").replace("<head>", "<head><title/>"),
        )
        .unit(
            "c4",
            "Text/chapter4.xhtml",
            &xhtml(Some("Chapter Four"), "<p>Hello</p><p>World</p>")
                .replace("</title>", "</title><script type=\"text/javascript\" src=\"../a.js\"/>"),
        );
    let doc = Document::from_bytes(book.build()).unwrap();
    let table = build_chapter_table(&doc, encoding_rs::UTF_8, "Cover").unwrap();

    assert_eq!(table.get(3).unwrap().title, "");
    assert_eq!(table.get(4).unwrap().title, "Chapter Four");

    for index in [3, 4] {
        let unit = doc.unit(index).unwrap();
        assert_eq!(
            extract_chapter_text(&unit, encoding_rs::UTF_8, &WebTextFormatter).unwrap(),
            "\u{3000}\u{3000}Hello\r\n\u{3000}\u{3000}World"
        );
    }
}

#[test]
fn test_unreadable_unit_degrades_to_empty_title() {
    let book = three_unit_book().missing_unit("lost", "Text/lost.xhtml");
    let doc = Document::from_bytes(book.build()).unwrap();

    let table = build_chapter_table(&doc, encoding_rs::UTF_8, "Cover").unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table.get(3).unwrap().title, "");
    assert_eq!(table.get(3).unwrap().source_ref, "OEBPS/Text/lost.xhtml");

    let unit = doc.unit(3).unwrap();
    let err = extract_chapter_text(&unit, encoding_rs::UTF_8, &WebTextFormatter).unwrap_err();
    match err {
        ExtractError::Decode { href, .. } => assert_eq!(href, "OEBPS/Text/lost.xhtml"),
        other => panic!("expected Decode, got {other:?}"),
    }
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_undeclared_gbk_book_is_detected() {
    let book = EpubBuilder::new()
        .unit_bytes(
            "cover",
            "cover.xhtml",
            gbk_chapter("封面", "<p>我们的生活中有很多美好的事情，他说这是一个大家都知道的道理。</p>"),
        )
        .unit_bytes(
            "c1",
            "c1.xhtml",
            gbk_chapter("第一章 开始", "<p>他说：“这是我的书。”</p><p>我们到了。</p>"),
        );
    let doc = Document::from_bytes(book.build()).unwrap();

    let encoding = resolve_encoding(&doc);
    assert_eq!(encoding, encoding_rs::GB18030);

    let table = build_chapter_table(&doc, encoding, "封面").unwrap();
    assert_eq!(table.get(1).unwrap().title, "第一章 开始");

    let text = extract_chapter_text(&doc.unit(1).unwrap(), encoding, &WebTextFormatter).unwrap();
    assert_eq!(
        text,
        "\u{3000}\u{3000}他说：“这是我的书。”\r\n\u{3000}\u{3000}我们到了。"
    );
}

#[test]
fn test_image_only_cover_samples_next_unit() {
    let book = EpubBuilder::new()
        .unit("cover", "cover.xhtml", &xhtml(None, "<img src=\"cover.jpg\"/>"))
        .unit_bytes(
            "c1",
            "c1.xhtml",
            gbk_chapter("第一章", "<p>我们的生活中有很多美好的事情，他说这是一个大家都知道的道理。</p>"),
        );
    let doc = Document::from_bytes(book.build()).unwrap();
    assert_eq!(resolve_encoding(&doc), encoding_rs::GB18030);
}

#[test]
fn test_declared_meta_charset_wins() {
    // Declared Big5, and every non-ASCII byte is valid Big5.
    let (body, _, _) = encoding_rs::BIG5.encode("<p>這是一本書。</p>");
    let mut markup =
        b"<html><head><meta charset=\"big5\"/><title>x</title></head><body>".to_vec();
    markup.extend_from_slice(&body);
    markup.extend_from_slice(b"</body></html>");

    let book = EpubBuilder::new().unit_bytes("c0", "c0.xhtml", markup);
    let doc = Document::from_bytes(book.build()).unwrap();

    let encoding = resolve_encoding(&doc);
    assert_eq!(encoding, encoding_rs::BIG5);
    let text = extract_chapter_text(&doc.unit(0).unwrap(), encoding, &WebTextFormatter).unwrap();
    assert_eq!(text, "這是一本書。");
}

#[test]
fn test_ascii_book_is_utf8() {
    let doc = Document::from_bytes(three_unit_book().build()).unwrap();
    assert_eq!(resolve_encoding(&doc), encoding_rs::UTF_8);
}
