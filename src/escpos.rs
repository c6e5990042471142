//! Minimal ESC/POS binary command builder for thermal printers.
//!
//! Text is encoded as CP850 so Spanish accents and `ñ` print correctly.

// ESC/POS command bytes
const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// ESC t code page number for CP850 (Multilingual Latin 1).
const CODE_PAGE_CP850: u8 = 2;

/// Paper width in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperWidth {
    Mm58,
    Mm80,
}

impl PaperWidth {
    pub fn chars(self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }

    pub fn from_mm(mm: i32) -> Self {
        if mm <= 58 {
            PaperWidth::Mm58
        } else {
            PaperWidth::Mm80
        }
    }
}

/// Builder for ESC/POS command buffers.
///
/// ```rust,ignore
/// let mut b = EscPosBuilder::new().with_paper(PaperWidth::Mm58);
/// b.init().latin().center().bold(true).text("CORTE DIARIO").lf().bold(false);
/// b.line_pair("Efectivo", "$1,250.00").feed(3).cut();
/// let bytes = b.build();
/// ```
pub struct EscPosBuilder {
    buffer: Vec<u8>,
    paper: PaperWidth,
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            paper: PaperWidth::Mm80,
        }
    }

    pub fn with_paper(mut self, paper: PaperWidth) -> Self {
        self.paper = paper;
        self
    }

    pub fn width(&self) -> usize {
        self.paper.chars()
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// ESC @: Initialize printer, reset to defaults.
    pub fn init(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x40]);
        self
    }

    /// ESC t n: Select character code page.
    pub fn code_page(&mut self, page: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x74, page]);
        self
    }

    /// Select CP850, the code page [`EscPosBuilder::text`] encodes for.
    pub fn latin(&mut self) -> &mut Self {
        self.code_page(CODE_PAGE_CP850)
    }

    // -----------------------------------------------------------------------
    // Text formatting
    // -----------------------------------------------------------------------

    /// ESC E n: Bold on/off.
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buffer
            .extend_from_slice(&[ESC, 0x45, if on { 1 } else { 0 }]);
        self
    }

    /// GS ! n: Set text size (width × height multiplier, 1–8 each).
    pub fn text_size(&mut self, width: u8, height: u8) -> &mut Self {
        let w = width.clamp(1, 8) - 1;
        let h = height.clamp(1, 8) - 1;
        self.buffer.extend_from_slice(&[GS, 0x21, (w << 4) | h]);
        self
    }

    pub fn normal_size(&mut self) -> &mut Self {
        self.text_size(1, 1)
    }

    pub fn double_height(&mut self) -> &mut Self {
        self.text_size(1, 2)
    }

    // -----------------------------------------------------------------------
    // Alignment
    // -----------------------------------------------------------------------

    /// ESC a 0: Left-align.
    pub fn left(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 0]);
        self
    }

    /// ESC a 1: Centre-align.
    pub fn center(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 1]);
        self
    }

    /// ESC a 2: Right-align.
    pub fn right(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 2]);
        self
    }

    // -----------------------------------------------------------------------
    // Text output
    // -----------------------------------------------------------------------

    /// Append text encoded as CP850. Unmapped characters print as `?`.
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buffer.extend(encode_cp850(s));
        self
    }

    pub fn lf(&mut self) -> &mut Self {
        self.buffer.push(LF);
        self
    }

    /// Horizontal rule of dashes across the paper width.
    pub fn separator(&mut self) -> &mut Self {
        let width = self.paper.chars();
        self.buffer.extend(std::iter::repeat(b'-').take(width));
        self.buffer.push(LF);
        self
    }

    /// Label on the left, value flush right.
    pub fn line_pair(&mut self, label: &str, value: &str) -> &mut Self {
        let width = self.paper.chars();
        let gap = width.saturating_sub(label.chars().count() + value.chars().count());
        self.text(label);
        self.buffer.extend(std::iter::repeat(b' ').take(gap.max(1)));
        self.text(value);
        self.lf()
    }

    // -----------------------------------------------------------------------
    // Feed / cut
    // -----------------------------------------------------------------------

    /// ESC d n: Feed n lines.
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    /// GS V A 16: Partial cut with 16-dot feed.
    pub fn cut(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x56, 0x41, 0x10]);
        self
    }

    /// Consume the builder and return the binary ESC/POS payload.
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

// ---------------------------------------------------------------------------
// CP850 encoding
// ---------------------------------------------------------------------------

fn encode_cp850(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let code = ch as u32;
        if code < 0x80 {
            bytes.push(code as u8);
        } else {
            bytes.push(latin_to_cp850(ch).unwrap_or(b'?'));
        }
    }
    bytes
}

fn latin_to_cp850(ch: char) -> Option<u8> {
    let byte = match ch {
        'á' => 0xA0,
        'é' => 0x82,
        'í' => 0xA1,
        'ó' => 0xA2,
        'ú' => 0xA3,
        'ñ' => 0xA4,
        'Ñ' => 0xA5,
        'ü' => 0x81,
        'Ü' => 0x9A,
        'Á' => 0xB5,
        'É' => 0x90,
        'Í' => 0xD6,
        'Ó' => 0xE0,
        'Ú' => 0xE9,
        '¿' => 0xA8,
        '¡' => 0xAD,
        '°' => 0xF8,
        _ => return None,
    };
    Some(byte)
}
