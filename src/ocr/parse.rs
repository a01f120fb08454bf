use std::collections::BTreeMap;

/// Word classes that open a new text line in hOCR output.
const HOCR_LINE_CLASSES: [&str; 4] = ["ocr_line", "ocr_caption", "ocr_textfloat", "ocr_header"];

#[derive(Debug, Clone, PartialEq)]
struct Word {
    text: String,
    conf: f32,
    left: u32,
    top: u32,
}

impl Word {
    fn weight(&self) -> f32 {
        self.text.chars().count().max(1) as f32
    }
}

/// Words of one line joined for display. `conf` is the character-weighted
/// mean on tesseract's 0-100 scale and `weight` the character count behind it.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct TextLine {
    pub text: String,
    pub conf: f32,
    pub weight: f32,
    top: u32,
    left: u32,
}

/// Word rows (level 5) of tesseract TSV output, one line per
/// `(page, block, paragraph, line)` key.
pub(super) fn parse_tsv_lines(tsv: &str) -> Vec<TextLine> {
    let mut grouped: BTreeMap<[i32; 4], Vec<Word>> = BTreeMap::new();
    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let conf = cols[10].parse::<f32>().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        let key = |idx: usize| cols[idx].parse::<i32>().unwrap_or(0);
        let px = |idx: usize| cols[idx].parse::<u32>().unwrap_or(0);
        grouped
            .entry([key(1), key(2), key(3), key(4)])
            .or_default()
            .push(Word {
                text: text.to_string(),
                conf,
                left: px(6),
                top: px(7),
            });
    }
    collect_lines(grouped.into_values())
}

/// Lines of tesseract hOCR output. Words before the first line span are
/// ignored.
pub(super) fn parse_hocr_lines(hocr: &str) -> Vec<TextLine> {
    let mut groups: Vec<Vec<Word>> = Vec::new();
    let mut rest = hocr;
    while let Some(start) = rest.find("<span") {
        let Some(tag_len) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start..start + tag_len];
        rest = &rest[start + tag_len + 1..];

        let class = attribute(tag, "class").unwrap_or_default();
        if HOCR_LINE_CLASSES.contains(&class) {
            groups.push(Vec::new());
        } else if class == "ocrx_word" {
            let end = rest.find("</span>").unwrap_or(rest.len());
            let text = decode_entities(&strip_tags(&rest[..end]));
            rest = &rest[end..];
            let word = hocr_word(tag, text.trim());
            if let (Some(word), Some(line)) = (word, groups.last_mut()) {
                line.push(word);
            }
        }
    }
    collect_lines(groups)
}

fn hocr_word(tag: &str, text: &str) -> Option<Word> {
    if text.is_empty() {
        return None;
    }
    let title = attribute(tag, "title")?;
    let mut origin = None;
    let mut conf = None;
    for field in title.split(';').map(str::trim) {
        if let Some(values) = field.strip_prefix("bbox ") {
            let mut nums = values.split_whitespace().filter_map(|v| v.parse::<u32>().ok());
            origin = nums.next().zip(nums.next());
        } else if let Some(value) = field.strip_prefix("x_wconf ") {
            conf = value.trim().parse::<f32>().ok();
        }
    }
    let (left, top) = origin?;
    Some(Word {
        text: text.to_string(),
        conf: conf?,
        left,
        top,
    })
}

/// Builds each group into a line and puts the lines in reading order.
fn collect_lines(groups: impl IntoIterator<Item = Vec<Word>>) -> Vec<TextLine> {
    let mut lines = groups
        .into_iter()
        .filter_map(|mut words| {
            words.sort_by_key(|word| word.left);
            build_line(&words)
        })
        .collect::<Vec<_>>();
    lines.sort_by_key(|line| (line.top, line.left));
    lines
}

fn build_line(words: &[Word]) -> Option<TextLine> {
    let mut text = String::new();
    for word in words {
        if needs_space(&text, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
    }
    if text.trim().is_empty() {
        return None;
    }
    let weight = words.iter().map(Word::weight).sum::<f32>();
    let conf = words.iter().map(|w| w.conf * w.weight()).sum::<f32>() / weight;
    Some(TextLine {
        text: text.trim().to_string(),
        conf,
        weight,
        top: words.iter().map(|w| w.top).min()?,
        left: words.iter().map(|w| w.left).min()?,
    })
}

/// Latin words are separated by a space; CJK runs are not.
fn needs_space(left: &str, right: &str) -> bool {
    let last = left.trim_end().chars().last();
    let first = right.trim_start().chars().next();
    let (Some(a), Some(b)) = (last, first) else {
        return false;
    };
    let latin = |ch: char| ch.is_ascii_graphic() || (ch.is_alphabetic() && !is_cjk_or_kana(ch));
    latin(a) && latin(b)
}

fn is_cjk_or_kana(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3040..=0x30FF | 0x31F0..=0x31FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF
    )
}

/// Value of `name='...'` or `name="..."` inside an opening tag.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let key = format!("{}=", name);
    let rest = &tag[tag.find(&key)? + key.len()..];
    let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let rest = &rest[1..];
    Some(&rest[..rest.find(quote)?])
}

fn strip_tags(value: &str) -> String {
    let mut depth = 0usize;
    value
        .chars()
        .filter(|&ch| match ch {
            '<' => {
                depth += 1;
                false
            }
            '>' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        })
        .collect()
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .replace('\u{00a0}', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOCR: &str = r#"<div class='ocr_page' title='bbox 0 0 200 60'>
 <span class='ocr_line' id='line_1_2' title="bbox 2 30 80 46">
  <span class='ocrx_word' id='word_1_3' title='bbox 2 30 80 46; x_wconf 60'>A&amp;B</span>
 </span>
 <span class='ocr_line' id='line_1_1' title="bbox 2 4 120 20; baseline 0 -3">
  <span class='ocrx_word' id='word_1_2' title='bbox 56 4 120 20; x_wconf 80'>1,200</span>
  <span class='ocrx_word' title='bbox 2 4 50 20; x_wconf 90'><strong>Total</strong></span>
 </span>
</div>"#;

    const TSV_HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\t\
left\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn hocr_lines_follow_reading_order() {
        let lines = parse_hocr_lines(HOCR);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Total 1,200");
        assert!((lines[0].conf - (90.0 * 5.0 + 80.0 * 5.0) / 10.0).abs() < 1e-4);
        assert_eq!(lines[0].weight, 10.0);
        assert_eq!(lines[1].text, "A&B");
        assert!((lines[1].conf - 60.0).abs() < 1e-4);
    }

    #[test]
    fn empty_hocr_has_no_lines() {
        assert!(parse_hocr_lines("<div class='ocr_page'></div>").is_empty());
        assert!(parse_hocr_lines("").is_empty());
        let orphan = "<span class='ocrx_word' title='bbox 0 0 5 5; x_wconf 90'>x</span>";
        assert!(parse_hocr_lines(orphan).is_empty());
    }

    #[test]
    fn tsv_words_group_by_line_key() {
        let tsv = [
            TSV_HEADER,
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t40\t-1\t",
            "5\t1\t1\t1\t2\t1\t10\t22\t30\t12\t50\tLo",
            "5\t1\t1\t1\t1\t2\t50\t2\t40\t14\t70\tbeta",
            "5\t1\t1\t1\t1\t1\t4\t2\t40\t14\t90\talpha",
            "5\t1\t1\t1\t1\t3\t95\t2\t5\t14\t-1\t ",
        ]
        .join("\n");
        let lines = parse_tsv_lines(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "alpha beta");
        assert!((lines[0].conf - (90.0 * 5.0 + 70.0 * 4.0) / 9.0).abs() < 1e-4);
        assert_eq!(lines[1].text, "Lo");
    }

    #[test]
    fn cjk_words_join_without_space() {
        assert!(!needs_space("東京", "都"));
        assert!(needs_space("alpha", "beta"));
        assert!(needs_space("12", "kg"));
        assert!(!needs_space("", "x"));
    }
}
