/// Defensive parsing of free-text oracle replies.
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{PilotError, PilotResult};
use crate::localize::geometry::BoundingBox;

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"))
}

fn coords_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+|\d+").expect("valid coords regex"))
}

fn bbox_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<\|box_start\|>(.*?)<\|box_end\|>").expect("valid bbox regex")
    })
}

fn round_all(re: &Regex, text: &str) -> Vec<i64> {
    re.find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .map(|n| n.round() as i64)
        .collect()
}

/// Signed integers in `text`; decimals are rounded to the nearest integer.
pub fn extract_integers(text: &str) -> Vec<i64> {
    round_all(number_pattern(), text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellChoice {
    Cell(usize),
    /// The oracle answered -1.
    NotVisible,
}

/// Parse a grid-oracle reply: exactly one integer in `[-1, cell_count - 1]`.
pub fn parse_cell_index(text: &str, cell_count: usize) -> PilotResult<CellChoice> {
    let numbers = extract_integers(text);
    let [n] = numbers.as_slice() else {
        return Err(PilotError::Localization(format!(
            "expected exactly one cell index, found {} number(s) in reply: {text:?}",
            numbers.len()
        )));
    };
    match *n {
        -1 => Ok(CellChoice::NotVisible),
        n if n >= 0 && (n as u64) < cell_count as u64 => Ok(CellChoice::Cell(n as usize)),
        n => Err(PilotError::Localization(format!(
            "cell index {n} outside [-1, {}] in reply: {text:?}",
            cell_count as i64 - 1
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BboxReply {
    Point(i32, i32),
    Box(BoundingBox),
}

impl BboxReply {
    pub fn bounding_box(&self) -> BoundingBox {
        match *self {
            BboxReply::Point(x, y) => BoundingBox::point(x, y),
            BboxReply::Box(b) => b,
        }
    }

    pub fn point(&self) -> (i32, i32) {
        match *self {
            BboxReply::Point(x, y) => (x, y),
            BboxReply::Box(b) => b.midpoint(),
        }
    }
}

/// Parse a bounding-box oracle reply.
///
/// Text inside `<|box_start|>…<|box_end|>` is used when present. Two numbers
/// are a point; four or more are a box built from the first two pairs.
pub fn parse_bbox_reply(text: &str) -> PilotResult<BboxReply> {
    let inner = bbox_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    let numbers = round_all(coords_pattern(), inner);
    let n = numbers
        .iter()
        .take(4)
        .map(|&v| {
            i32::try_from(v).map_err(|_| {
                PilotError::Localization(format!("bbox coordinate {v} out of range: {text:?}"))
            })
        })
        .collect::<PilotResult<Vec<i32>>>()?;
    match numbers.len() {
        2 => Ok(BboxReply::Point(n[0], n[1])),
        len if len >= 4 => Ok(BboxReply::Box(BoundingBox::new(n[0], n[1], n[2], n[3]))),
        len => Err(PilotError::Localization(format!(
            "unexpected bbox format ({len} number(s)): {text:?}"
        ))),
    }
}
