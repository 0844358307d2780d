//! Turns an unordered set of detected symbols into one line of expression
//! text that [`Expression::parse`](crate::Expression::parse) understands.
//!
//! Stages, in order:
//!
//! 1. drop low-confidence detections
//! 2. sort by horizontal center (a single line of math is assumed)
//! 3. merge letter runs that spell a function name (`s i n` → `sin`)
//! 4. group raised, smaller symbols into exponents (`x²` → `x^(2)`)
//! 5. rewrite notations: `|x|` → `abs(x)`, `d/dx` → `diff(x)`,
//!    `lim(...)` → `limit(...)`, `√x` → `sqrt(x)`, `sin x` → `sin(x)`
//! 6. repair brackets the detector flipped
//! 7. insert implicit multiplication (`2x` → `2*x`)
//! 8. concatenate
//!
//! Nothing here fails: problems are reported as warnings next to a
//! best-effort string, and the parser decides whether that string is usable.

use bitvec::prelude::*;

use crate::geometry::{BoundingBox, DetectedSymbol, SymbolSet};

/// Detections scoring below this are dropped.
pub const SCORE_THRESHOLD: f64 = 0.10;

/// An exponent's center sits above its base's center by more than this
/// fraction of the base height.
pub const SUPERSCRIPT_RISE: f64 = 0.15;

/// An exponent is shorter than this fraction of its base height.
pub const SUPERSCRIPT_SHRINK: f64 = 0.85;

/// An exponent starts before the base's right edge plus this many base widths.
pub const SUPERSCRIPT_REACH: f64 = 1.5;

/// Adjacent digits further apart than this fraction of their mean width are
/// flagged, though still read as one number.
pub const DIGIT_CONTINUITY: f64 = 0.5;

/// Upper bound on bracket repair passes.
pub const MAX_REPAIR_PASSES: usize = 10;

/// Letter spellings merged into a single function token. Scanned in order
/// and the first exact match wins.
const SPELLED_NAMES: &[&str] = &[
    "sqrt", "sin", "sec", "cos", "csc", "cot", "tan", "log", "ln", "exp", "abs", "lim",
];

/// Tunable thresholds. [`Default`] uses the crate constants.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearizerConfig {
    pub score_threshold: f64,
    pub superscript_rise: f64,
    pub superscript_shrink: f64,
    pub superscript_reach: f64,
    pub digit_continuity: f64,
    pub max_repair_passes: usize,
}

impl Default for LinearizerConfig {
    fn default() -> Self {
        Self {
            score_threshold: SCORE_THRESHOLD,
            superscript_rise: SUPERSCRIPT_RISE,
            superscript_shrink: SUPERSCRIPT_SHRINK,
            superscript_reach: SUPERSCRIPT_REACH,
            digit_continuity: DIGIT_CONTINUITY,
            max_repair_passes: MAX_REPAIR_PASSES,
        }
    }
}

/// Expression text plus everything that looked off while building it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Linearization {
    pub expr: String,
    pub warnings: Vec<String>,
}

/// Linearizes with the default configuration.
pub fn linearize(symbols: &SymbolSet) -> Linearization {
    Linearizer::default().linearize(symbols)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Number,
    Variable,
    Function,
    Operator,
    Open,
    Close,
    Bar,
    Comma,
    Root,
    Other,
}

impl Kind {
    fn of(text: &str) -> Self {
        match text {
            "+" | "-" | "*" | "/" | "^" => Self::Operator,
            "(" => Self::Open,
            ")" => Self::Close,
            "|" => Self::Bar,
            "," => Self::Comma,
            "√" => Self::Root,
            "π" | "ℯ" => Self::Variable,
            _ if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit() || c == '.') => {
                Self::Number
            }
            _ if SPELLED_NAMES.contains(&text) => Self::Function,
            _ if text.len() == 1 && text.chars().all(|c| c.is_ascii_lowercase()) => Self::Variable,
            _ => Self::Other,
        }
    }

    /// A value may end here: `2`, `x`, `)`, a closing bar.
    fn ends_value(self) -> bool {
        matches!(self, Self::Number | Self::Variable | Self::Close | Self::Bar)
    }

    /// A value may start here: `2`, `x`, `(`, `sin`, `√`.
    fn starts_value(self) -> bool {
        matches!(
            self,
            Self::Number | Self::Variable | Self::Open | Self::Function | Self::Root
        )
    }
}

/// Detector spellings folded into the grammar's characters.
fn normalize(token: &str) -> &str {
    match token {
        "×" | "·" => "*",
        "÷" => "/",
        "−" | "–" => "-",
        "[" | "{" => "(",
        "]" | "}" => ")",
        other => other,
    }
}

/// One token of the output line. Synthesized pieces have no box, and only
/// pieces with a box are ever flipped by bracket repair.
#[derive(Clone, Debug)]
struct Piece {
    text: String,
    kind: Kind,
    bbox: Option<BoundingBox>,
}

impl Piece {
    fn detected(symbol: &DetectedSymbol) -> Self {
        let text = normalize(symbol.token.trim());
        Self {
            text: text.to_string(),
            kind: Kind::of(text),
            bbox: Some(symbol.bbox),
        }
    }

    fn synthetic(text: &str, kind: Kind) -> Self {
        Self {
            text: text.to_string(),
            kind,
            bbox: None,
        }
    }

    fn center_x(&self) -> f64 {
        self.bbox.map_or(f64::NAN, |b| b.center_x())
    }
}

fn note(warnings: &mut Vec<String>, message: String) {
    log::warn!("{message}");
    warnings.push(message);
}

/// Geometric linearizer.
#[derive(Clone, Debug, Default)]
pub struct Linearizer {
    config: LinearizerConfig,
}

impl Linearizer {
    pub fn new(config: LinearizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinearizerConfig {
        &self.config
    }

    pub fn linearize(&self, set: &SymbolSet) -> Linearization {
        let mut warnings = Vec::new();

        let Some(mut symbols) = self.filter(set, &mut warnings) else {
            return Linearization {
                expr: String::new(),
                warnings,
            };
        };
        symbols.sort_by(|a, b| a.bbox.center_x().total_cmp(&b.bbox.center_x()));

        let pieces: Vec<Piece> = symbols.into_iter().map(Piece::detected).collect();
        let pieces = merge_spelled_names(pieces);
        let pieces = self.group_superscripts(pieces, &mut warnings);
        let pieces = pair_bars(pieces, &mut warnings);
        let mut pieces = rewrite_notations(&pieces, &mut warnings);
        self.repair_brackets(&mut pieces, &mut warnings);
        let pieces = self.insert_multiplication(pieces, &mut warnings);

        let expr: String = pieces.iter().map(|p| p.text.as_str()).collect();
        if !is_balanced(&expr) {
            note(
                &mut warnings,
                "unbalanced brackets in reconstructed expression (possible detection error)"
                    .to_string(),
            );
        }
        log::debug!("linearized {} symbols into {expr:?}", set.len());

        Linearization { expr, warnings }
    }

    fn filter<'a>(
        &self,
        set: &'a SymbolSet,
        warnings: &mut Vec<String>,
    ) -> Option<Vec<&'a DetectedSymbol>> {
        if set.is_empty() {
            note(warnings, "no symbols detected".to_string());
            return None;
        }
        let threshold = self.config.score_threshold;
        let (kept, dropped): (Vec<_>, Vec<_>) =
            set.symbols.iter().partition(|s| s.score >= threshold);

        if !dropped.is_empty() {
            let (mut digits, mut operators, mut functions, mut others) = (0, 0, 0, 0);
            for symbol in &dropped {
                match Kind::of(normalize(&symbol.token)) {
                    Kind::Number => digits += 1,
                    Kind::Operator => operators += 1,
                    Kind::Function | Kind::Root => functions += 1,
                    _ => others += 1,
                }
            }
            let parts: Vec<String> = [
                (digits, "digit"),
                (operators, "operator"),
                (functions, "function"),
                (others, "other"),
            ]
            .into_iter()
            .filter(|(count, _)| *count > 0)
            .map(|(count, what)| format!("{count} {what}{}", if count == 1 { "" } else { "s" }))
            .collect();
            note(
                warnings,
                format!(
                    "dropped low-confidence symbols: {} (threshold={threshold:.2})",
                    parts.join(", ")
                ),
            );
        }

        if kept.is_empty() {
            let scores = set.symbols.iter().map(|s| s.score);
            let min = scores.clone().fold(f64::INFINITY, f64::min);
            let max = scores.clone().fold(f64::NEG_INFINITY, f64::max);
            let mean = scores.sum::<f64>() / set.len() as f64;
            note(
                warnings,
                format!(
                    "no symbols left after filtering (detected={}, score range={min:.3}-{max:.3}, mean={mean:.3}, threshold={threshold:.2})",
                    set.len()
                ),
            );
            return None;
        }
        log::debug!("kept {} of {} symbols", kept.len(), set.len());
        Some(kept)
    }

    fn is_superscript(&self, base: &Piece, candidate: &Piece) -> bool {
        if !base.kind.ends_value() {
            return false;
        }
        let (Some(a), Some(b)) = (base.bbox, candidate.bbox) else {
            return false;
        };
        if b.center_x() <= a.center_x() {
            return false;
        }
        let above = b.center_y() < a.center_y() - self.config.superscript_rise * a.height();
        let smaller = b.height() < self.config.superscript_shrink * a.height();
        let near =
            b.x1() > a.center_x() && b.x1() < a.x2() + self.config.superscript_reach * a.width();
        above && smaller && near
    }

    fn group_superscripts(&self, pieces: Vec<Piece>, warnings: &mut Vec<String>) -> Vec<Piece> {
        let mut out = Vec::with_capacity(pieces.len());
        let mut i = 0;
        while i < pieces.len() {
            let base = &pieces[i];
            out.push(base.clone());

            let mut j = i + 1;
            while j < pieces.len() && self.is_superscript(base, &pieces[j]) {
                j += 1;
            }
            if j > i + 1 {
                let mut run = pieces[i + 1..j].to_vec();
                if run.len() > 1 {
                    note(
                        warnings,
                        format!(
                            "multiple exponent candidates above '{}' ({} symbols), using all",
                            base.text,
                            run.len()
                        ),
                    );
                }
                run.sort_by(|a, b| a.center_x().total_cmp(&b.center_x()));
                log::debug!("exponent run after '{}': {} symbols", base.text, run.len());
                out.push(Piece::synthetic("^", Kind::Operator));
                out.push(Piece::synthetic("(", Kind::Open));
                out.extend(run);
                out.push(Piece::synthetic(")", Kind::Close));
            }
            i = j;
        }
        out
    }

    /// Flips misread brackets until they balance and nest, one flip per
    /// pass. Excess opens: flip the second of the first adjacent unmatched
    /// `((` pair, else the last unmatched `(`. Excess closes: flip the second
    /// of the first adjacent unmatched `))` pair, else the first unmatched
    /// `)`. Balanced but mis-nested: flip the first unmatched `)`.
    fn repair_brackets(&self, pieces: &mut [Piece], warnings: &mut Vec<String>) {
        let mut passes = 0;
        loop {
            let nesting = Nesting::of(pieces);
            if nesting.is_valid() {
                return;
            }
            if passes == self.config.max_repair_passes {
                break;
            }
            passes += 1;

            let flippable = |i: &usize| pieces[*i].bbox.is_some();
            let adjacent_pair = |kind: Kind, unmatched: &[usize]| {
                (1..pieces.len()).find(|&i| {
                    pieces[i - 1].kind == kind
                        && pieces[i].kind == kind
                        && flippable(&i)
                        && unmatched.contains(&i)
                })
            };
            let diff = nesting.opens as isize - nesting.closes as isize;
            let target = if diff >= 2 {
                adjacent_pair(Kind::Open, nesting.unmatched_opens.as_slice()).or_else(|| {
                    nesting
                        .unmatched_opens
                        .iter()
                        .rev()
                        .copied()
                        .find(|i| flippable(i))
                })
            } else if diff <= -2 {
                adjacent_pair(Kind::Close, nesting.unmatched_closes.as_slice()).or_else(|| {
                    nesting
                        .unmatched_closes
                        .iter()
                        .copied()
                        .find(|i| flippable(i))
                })
            } else if diff == 0 {
                nesting
                    .unmatched_closes
                    .iter()
                    .copied()
                    .find(|i| flippable(i))
            } else {
                // A flip moves the balance by two, so an odd excess of one
                // cannot be fixed.
                None
            };

            let Some(i) = target else {
                break;
            };
            let piece = &mut pieces[i];
            let (from, to, kind) = match piece.kind {
                Kind::Open => ("(", ")", Kind::Close),
                _ => (")", "(", Kind::Open),
            };
            piece.text = to.to_string();
            piece.kind = kind;
            log::debug!("bracket repair pass {passes}: flipped position {i}");
            note(
                warnings,
                format!("bracket repair: changed '{from}' at position {i} to '{to}'"),
            );
        }

        let nesting = Nesting::of(pieces);
        note(
            warnings,
            format!(
                "bracket repair gave up with {} unmatched bracket(s)",
                nesting.unmatched_opens.len() + nesting.unmatched_closes.len()
            ),
        );
    }

    fn insert_multiplication(&self, pieces: Vec<Piece>, warnings: &mut Vec<String>) -> Vec<Piece> {
        let mut out = Vec::with_capacity(pieces.len() * 2);
        for (k, a) in pieces.iter().enumerate() {
            out.push(a.clone());
            let Some(b) = pieces.get(k + 1) else {
                continue;
            };
            if a.kind == Kind::Number && b.kind == Kind::Number {
                // Never `1*2`: adjacent digits are one number.
                self.check_digit_gap(a, b, warnings);
                continue;
            }
            if a.kind.ends_value() && b.kind.starts_value() {
                out.push(Piece::synthetic("*", Kind::Operator));
            }
        }
        out
    }

    fn check_digit_gap(&self, a: &Piece, b: &Piece, warnings: &mut Vec<String>) {
        let (Some(left), Some(right)) = (a.bbox, b.bbox) else {
            return;
        };
        let gap = right.x1() - left.x2();
        let mean_width = (left.width() + right.width()) / 2.0;
        if gap > mean_width * self.config.digit_continuity {
            note(
                warnings,
                format!(
                    "digits '{}' and '{}' are {gap:.1}px apart, read as one number",
                    a.text, b.text
                ),
            );
        }
    }
}

fn merge_spelled_names(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len());
    let mut i = 0;
    while i < pieces.len() {
        if let Some(name) = spelled_name(&pieces[i..]) {
            let run = &pieces[i..i + name.len()];
            let bbox = run.iter().filter_map(|p| p.bbox).reduce(|a, b| a.union(&b));
            log::debug!("merged letters at {i} into '{name}'");
            out.push(Piece {
                text: name.to_string(),
                kind: Kind::Function,
                bbox,
            });
            i += name.len();
        } else {
            out.push(pieces[i].clone());
            i += 1;
        }
    }
    out
}

fn spelled_name(rest: &[Piece]) -> Option<&'static str> {
    SPELLED_NAMES.iter().copied().find(|name| {
        name.len() <= rest.len()
            && rest
                .iter()
                .zip(name.chars())
                .all(|(piece, c)| piece.text.len() == 1 && piece.text.starts_with(c))
    })
}

/// Resolves `|` glyphs into `abs(` and `)`. Scanning left to right, a bar
/// right after a value closes the innermost bar still open; any other bar
/// opens. Bars left unpaired stay as they are.
fn pair_bars(pieces: Vec<Piece>, warnings: &mut Vec<String>) -> Vec<Piece> {
    let n = pieces.len();
    let mut opening = bitvec![0; n];
    let mut closing = bitvec![0; n];
    let mut unused: Vec<usize> = Vec::new();

    for i in 0..n {
        if pieces[i].kind != Kind::Bar {
            continue;
        }
        let after_value = i > 0
            && match pieces[i - 1].kind {
                Kind::Bar => closing[i - 1],
                kind => kind.ends_value(),
            };
        if after_value {
            if let Some(open) = unused.pop() {
                opening.set(open, true);
                closing.set(i, true);
                continue;
            }
        }
        unused.push(i);
    }

    let mut out = Vec::with_capacity(n + 2 * opening.count_ones());
    for (i, piece) in pieces.into_iter().enumerate() {
        if opening[i] {
            out.push(Piece {
                text: "abs".to_string(),
                kind: Kind::Function,
                bbox: piece.bbox,
            });
            out.push(Piece::synthetic("(", Kind::Open));
        } else if closing[i] {
            out.push(Piece::synthetic(")", Kind::Close));
        } else {
            if piece.kind == Kind::Bar {
                note(
                    warnings,
                    format!("unpaired absolute-value bar at position {i}"),
                );
            }
            out.push(piece);
        }
    }
    out
}

/// `d / d x` → the variable `x`.
fn derivative_at(rest: &[Piece]) -> Option<&Piece> {
    match rest {
        [d1, slash, d2, var, ..]
            if d1.text == "d" && slash.text == "/" && d2.text == "d" && var.kind == Kind::Variable =>
        {
            Some(var)
        }
        _ => None,
    }
}

fn rewrite_notations(pieces: &[Piece], warnings: &mut Vec<String>) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len());
    let mut i = 0;
    while i < pieces.len() {
        if let Some(var) = derivative_at(&pieces[i..]) {
            out.push(Piece::synthetic("diff", Kind::Function));
            out.push(Piece::synthetic("(", Kind::Open));
            out.push(var.clone());
            out.push(Piece::synthetic(")", Kind::Close));
            i += 4;
            continue;
        }

        let piece = &pieces[i];
        if !matches!(piece.kind, Kind::Root | Kind::Function) {
            out.push(piece.clone());
            i += 1;
            continue;
        }

        let name = match piece.text.as_str() {
            "√" => "sqrt",
            "lim" => "limit",
            other => other,
        };
        let head = Piece {
            text: name.to_string(),
            kind: Kind::Function,
            bbox: piece.bbox,
        };
        let called = pieces.get(i + 1).is_some_and(|p| p.kind == Kind::Open);
        if called && piece.kind == Kind::Function {
            out.push(head);
            i += 1;
            continue;
        }

        let end = operand_end(pieces, i + 1);
        if piece.text == "lim" {
            note(
                warnings,
                format!("'lim' at position {i} has no parenthesized argument list"),
            );
        }
        if end == i + 1 {
            note(
                warnings,
                format!("'{}' at position {i} has no operand", piece.text),
            );
        }
        out.push(head);
        out.push(Piece::synthetic("(", Kind::Open));
        out.extend(rewrite_notations(&pieces[i + 1..end], warnings));
        out.push(Piece::synthetic(")", Kind::Close));
        i = end;
    }
    out
}

/// End of the operand run that starts at `start`: stops at an operator or
/// comma outside brackets, or at a `)` that closes an enclosing group.
fn operand_end(pieces: &[Piece], start: usize) -> usize {
    let mut depth = 0usize;
    let mut k = start;
    while k < pieces.len() {
        let piece = &pieces[k];
        match piece.kind {
            Kind::Open => depth += 1,
            Kind::Close => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            // A leading minus belongs to the operand.
            Kind::Operator if depth == 0 && !(k == start && piece.text == "-") => break,
            Kind::Comma if depth == 0 => break,
            _ => {}
        }
        k += 1;
    }
    k
}

struct Nesting {
    opens: usize,
    closes: usize,
    unmatched_opens: Vec<usize>,
    unmatched_closes: Vec<usize>,
}

impl Nesting {
    fn of(pieces: &[Piece]) -> Self {
        let mut nesting = Self {
            opens: 0,
            closes: 0,
            unmatched_opens: Vec::new(),
            unmatched_closes: Vec::new(),
        };
        for (i, piece) in pieces.iter().enumerate() {
            match piece.kind {
                Kind::Open => {
                    nesting.opens += 1;
                    nesting.unmatched_opens.push(i);
                }
                Kind::Close => {
                    nesting.closes += 1;
                    if nesting.unmatched_opens.pop().is_none() {
                        nesting.unmatched_closes.push(i);
                    }
                }
                _ => {}
            }
        }
        nesting
    }

    fn is_valid(&self) -> bool {
        self.unmatched_opens.is_empty() && self.unmatched_closes.is_empty()
    }
}

/// Same bracket rules the tokenizer applies: a leftover bar closes.
fn is_balanced(expr: &str) -> bool {
    let mut depth = 0i64;
    for c in expr.chars() {
        match c {
            '(' => depth += 1,
            ')' | '|' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}
