//! Plain-text to PDF rendering.
//!
//! Lines are drawn top-down in Helvetica with a fixed leading. When a page
//! is full the text continues on a new page.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, dictionary};
use tracing::debug;

use crate::core::config::ExportConfig;
use crate::core::errors::ExportResult;

/// Font resource name used in content streams.
const FONT_RESOURCE: &str = "F1";

/// Renders arbitrary text into a paginated PDF.
#[derive(Clone, Debug, Default)]
pub struct DocumentExporter {
    layout: ExportConfig,
}

impl DocumentExporter {
    /// Create an exporter with the given page layout.
    #[must_use]
    pub const fn new(layout: ExportConfig) -> Self {
        Self { layout }
    }

    /// Suggested download name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.layout.file_name
    }

    /// Lines that fit between the first baseline and the bottom margin.
    #[must_use]
    pub fn lines_per_page(&self) -> usize {
        let usable = (self.layout.top - self.layout.bottom).max(0);
        let lines = usable / self.layout.leading.max(1) + 1;
        usize::try_from(lines).unwrap_or(1)
    }

    /// Render `text`, one PDF line per input line.
    ///
    /// Empty input produces a single blank page.
    ///
    /// # Errors
    /// Returns an error if the PDF writer fails.
    pub fn export(&self, text: &str) -> ExportResult<Vec<u8>> {
        let lines: Vec<&str> = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                FONT_RESOURCE => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for page_lines in lines.chunks(self.lines_per_page()) {
            let content = self.page_content(page_lines);
            let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let page_count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(self.layout.page_width),
                Object::Integer(self.layout.page_height),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        debug!(
            "Exported {} lines on {page_count} pages ({} bytes)",
            lines.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    fn page_content(&self, lines: &[&str]) -> Content {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                    Object::Integer(self.layout.font_size),
                ],
            ),
            Operation::new("TL", vec![Object::Integer(self.layout.leading)]),
            Operation::new(
                "Td",
                vec![
                    Object::Integer(self.layout.left),
                    Object::Integer(self.layout.top),
                ],
            ),
        ];

        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(to_win_ansi(line))],
            ));
        }

        operations.push(Operation::new("ET", vec![]));
        Content { operations }
    }
}

/// `WinAnsiEncoding` bytes for `line`; characters without a glyph become `?`.
fn to_win_ansi(line: &str) -> Vec<u8> {
    line.chars().map(win_ansi_byte).collect()
}

/// ASCII and `U+00A0..=U+00FF` map to themselves. `0x80..=0x9F` hold
/// typographic punctuation in place of the C1 controls, which have no glyph.
fn win_ansi_byte(c: char) -> u8 {
    match c {
        '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => {
            u8::try_from(u32::from(c)).unwrap_or(b'?')
        }
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => b'?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Raw operand bytes of every `Tj` operation, grouped by page.
    fn page_bytes(bytes: &[u8]) -> Vec<Vec<Vec<u8>>> {
        let doc = Document::load_mem(bytes).unwrap_or_else(|e| panic!("load: {e}"));
        doc.get_pages()
            .values()
            .map(|page_id| {
                let data = doc
                    .get_page_content(*page_id)
                    .unwrap_or_else(|e| panic!("content: {e}"));
                let content = Content::decode(&data).unwrap_or_else(|e| panic!("decode: {e}"));
                content
                    .operations
                    .iter()
                    .filter(|op| op.operator == "Tj")
                    .filter_map(|op| match op.operands.first() {
                        Some(Object::String(text, _)) => Some(text.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    /// Text of every `Tj` operation, grouped by page.
    fn page_lines(bytes: &[u8]) -> Vec<Vec<String>> {
        page_bytes(bytes)
            .into_iter()
            .map(|page| {
                page.iter()
                    .map(|text| String::from_utf8_lossy(text).into_owned())
                    .collect()
            })
            .collect()
    }

    fn export(text: &str) -> Vec<u8> {
        DocumentExporter::default()
            .export(text)
            .unwrap_or_else(|e| panic!("export: {e}"))
    }

    #[test]
    fn test_output_is_pdf() {
        let bytes = export("Once upon a time...");
        assert!(bytes.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn test_lines_are_rendered_in_order() {
        let pages = page_lines(&export("Once upon a time...\nThe end.\r\n"));
        assert_eq!(pages, vec![vec!["Once upon a time...", "The end.", ""]]);
    }

    #[test]
    fn test_empty_text_gives_one_blank_page() {
        let pages = page_lines(&export(""));
        assert_eq!(pages, vec![vec![String::new()]]);
    }

    #[test]
    fn test_long_text_flows_onto_new_pages() {
        let exporter = DocumentExporter::default();
        let per_page = exporter.lines_per_page();
        assert_eq!(per_page, 51);

        let text: Vec<String> = (0..120).map(|i| format!("line {i}")).collect();
        let pages = page_lines(&export(&text.join("\n")));

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), per_page);
        assert_eq!(pages[2].len(), 120 - 2 * per_page);
        assert_eq!(pages[1][0], format!("line {per_page}"));
        assert_eq!(pages.concat(), text);
    }

    #[test]
    fn test_export_is_idempotent() {
        let text = "A keeper\nA lamp\nA storm";
        assert_eq!(page_lines(&export(text)), page_lines(&export(text)));
    }

    #[test]
    fn test_characters_outside_latin1_are_replaced() {
        assert_eq!(to_win_ansi("café ☕"), b"caf\xe9 ?".to_vec());
    }

    #[test]
    fn test_typographic_punctuation_uses_win_ansi_slots() {
        let pages = page_bytes(&export(
            "It\u{2019}s \u{201C}Run!\u{201D} \u{2014} wait\u{2026} 9\u{2013}5 \u{20AC}3",
        ));
        assert_eq!(
            pages,
            vec![vec![b"It\x92s \x93Run!\x94 \x97 wait\x85 9\x965 \x803".to_vec()]]
        );
    }

    #[test]
    fn test_c1_controls_have_no_glyph() {
        assert_eq!(to_win_ansi("a\u{0085}b\u{0080}"), b"a?b?".to_vec());
        assert_eq!(to_win_ansi("\u{0152}uvre \u{2122}"), b"\x8cuvre \x99".to_vec());
    }

    #[test]
    fn test_parentheses_survive_escaping() {
        let pages = page_lines(&export("(aside) \\ slash"));
        assert_eq!(pages, vec![vec!["(aside) \\ slash"]]);
    }
}
