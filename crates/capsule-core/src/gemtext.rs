use std::str::Lines;

/// One parsed line of a `text/gemini` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GemtextLine<'a> {
    /// Plain text outside a preformatted block.
    Text(&'a str),
    /// `=> <url> [label]` link line.
    Link {
        url: &'a str,
        label: Option<&'a str>,
    },
    /// `#`, `##` or `###` heading.
    Heading { level: u8, text: &'a str },
    /// `* ` list item.
    Bullet(&'a str),
    /// `> ` quote line.
    Quote(&'a str),
    /// ```` ``` ```` fence. `alt` carries the alt text of an opening fence.
    PreformatToggle { alt: Option<&'a str> },
    /// Verbatim line inside a preformatted block.
    Preformatted(&'a str),
}

/// Streaming `text/gemini` parser.
///
/// Iterates over the lines of a document, tracking preformatted state across
/// fences. Lines inside a fence come back verbatim as
/// [`GemtextLine::Preformatted`].
#[derive(Debug, Clone)]
pub struct Gemtext<'a> {
    lines: Lines<'a>,
    preformatted: bool,
}

impl<'a> Gemtext<'a> {
    pub fn new(src: &'a str) -> Gemtext<'a> {
        Gemtext {
            lines: src.lines(),
            preformatted: false,
        }
    }
}

impl<'a> Iterator for Gemtext<'a> {
    type Item = GemtextLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;

        if let Some(rest) = line.strip_prefix("```") {
            self.preformatted = !self.preformatted;
            let alt = self.preformatted.then(|| rest.trim()).filter(|alt| !alt.is_empty());
            return Some(GemtextLine::PreformatToggle { alt });
        }
        if self.preformatted {
            return Some(GemtextLine::Preformatted(line));
        }
        if let Some(rest) = line.strip_prefix("=>") {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                let (url, label) = match rest.split_once(char::is_whitespace) {
                    Some((url, label)) => {
                        let label = label.trim_start();
                        (url, (!label.is_empty()).then_some(label))
                    }
                    None => (rest, None),
                };
                return Some(GemtextLine::Link { url, label });
            }
        }
        if line.starts_with('#') {
            let level = line.bytes().take_while(|byte| *byte == b'#').count();
            if level <= 3 {
                return Some(GemtextLine::Heading {
                    level: level as u8,
                    text: line[level..].trim_start(),
                });
            }
        }
        if let Some(rest) = line.strip_prefix("* ") {
            return Some(GemtextLine::Bullet(rest));
        }
        if let Some(rest) = line.strip_prefix('>') {
            return Some(GemtextLine::Quote(rest.trim_start()));
        }
        Some(GemtextLine::Text(line))
    }
}

/// Programmatic `text/gemini` emitter.
///
/// ```
/// use capsule_core::DocumentBuilder;
///
/// let mut doc = DocumentBuilder::new();
/// doc.h1("Hello world!");
/// doc.bullet("easy to write");
/// doc.link_with_label("/about", "about this capsule");
/// let body = doc.build();
/// assert!(body.starts_with("# Hello world!\n"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct DocumentBuilder {
    body: String,
}

impl DocumentBuilder {
    pub fn new() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    /// Appends a line, adding a trailing newline if the input lacks one.
    pub fn line(&mut self, line: &str) {
        self.body.push_str(line);
        if !line.ends_with('\n') {
            self.body.push('\n');
        }
    }

    pub fn h1(&mut self, heading: &str) {
        self.line(&format!("# {heading}"));
    }

    pub fn h2(&mut self, heading: &str) {
        self.line(&format!("## {heading}"));
    }

    pub fn h3(&mut self, heading: &str) {
        self.line(&format!("### {heading}"));
    }

    pub fn bullet(&mut self, item: &str) {
        self.line(&format!("* {item}"));
    }

    pub fn quote(&mut self, quote: &str) {
        self.line(&format!("> {quote}"));
    }

    pub fn link(&mut self, url: &str) {
        self.line(&format!("=> {url}"));
    }

    pub fn link_with_label(&mut self, url: &str, label: &str) {
        self.line(&format!("=> {url}\t{label}"));
    }

    pub fn toggle_preformatted(&mut self) {
        self.line("```");
    }

    pub fn build(self) -> String {
        self.body
    }
}
