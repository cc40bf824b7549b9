use std::{fmt, str::FromStr};

use crate::foundation::error::{CoverError, CoverResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Horizontal slats: bands stacked along the y axis.
    Horizontal,
    /// Vertical slats: bands side by side along the x axis.
    Vertical,
}

/// Every animation the compositing engine knows how to render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    #[default]
    Crossfade,
    Slide(Direction),
    Dissolve,
    Wipe(Direction),
    Blinds(Orientation),
    Circle,
    Diamond,
    Spiral,
    Checkerboard,
    /// Source fades to black; only used when the display goes idle.
    FadeOut,
}

impl TransitionKind {
    /// Kinds a user may pick for cover changes (everything except `FadeOut`).
    pub const SELECTABLE: [TransitionKind; 16] = [
        TransitionKind::Crossfade,
        TransitionKind::Slide(Direction::Left),
        TransitionKind::Slide(Direction::Right),
        TransitionKind::Slide(Direction::Up),
        TransitionKind::Slide(Direction::Down),
        TransitionKind::Dissolve,
        TransitionKind::Wipe(Direction::Left),
        TransitionKind::Wipe(Direction::Right),
        TransitionKind::Wipe(Direction::Up),
        TransitionKind::Wipe(Direction::Down),
        TransitionKind::Blinds(Orientation::Horizontal),
        TransitionKind::Blinds(Orientation::Vertical),
        TransitionKind::Circle,
        TransitionKind::Diamond,
        TransitionKind::Spiral,
        TransitionKind::Checkerboard,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransitionKind::Crossfade => "crossfade",
            TransitionKind::Slide(Direction::Left) => "slideLeft",
            TransitionKind::Slide(Direction::Right) => "slideRight",
            TransitionKind::Slide(Direction::Up) => "slideUp",
            TransitionKind::Slide(Direction::Down) => "slideDown",
            TransitionKind::Dissolve => "dissolve",
            TransitionKind::Wipe(Direction::Left) => "wipeLeft",
            TransitionKind::Wipe(Direction::Right) => "wipeRight",
            TransitionKind::Wipe(Direction::Up) => "wipeUp",
            TransitionKind::Wipe(Direction::Down) => "wipeDown",
            TransitionKind::Blinds(Orientation::Horizontal) => "blindsHorizontal",
            TransitionKind::Blinds(Orientation::Vertical) => "blindsVertical",
            TransitionKind::Circle => "circle",
            TransitionKind::Diamond => "diamond",
            TransitionKind::Spiral => "spiral",
            TransitionKind::Checkerboard => "checkerboard",
            TransitionKind::FadeOut => "fadeOut",
        }
    }

    pub fn is_selectable(self) -> bool {
        self != TransitionKind::FadeOut
    }

    /// Like [`FromStr`], but unknown or empty names fall back to crossfade.
    pub fn parse_lenient(s: &str) -> TransitionKind {
        match s.parse() {
            Ok(kind) => kind,
            Err(_) => {
                tracing::warn!(kind = s, "unknown transition kind, using crossfade");
                TransitionKind::Crossfade
            }
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransitionKind {
    type Err = CoverError;

    fn from_str(s: &str) -> CoverResult<Self> {
        let kind: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if kind.is_empty() {
            return Err(CoverError::validation("transition kind must be non-empty"));
        }

        let parsed = match kind.as_str() {
            "crossfade" | "fade" => TransitionKind::Crossfade,
            "slideleft" => TransitionKind::Slide(Direction::Left),
            "slideright" => TransitionKind::Slide(Direction::Right),
            "slideup" => TransitionKind::Slide(Direction::Up),
            "slidedown" => TransitionKind::Slide(Direction::Down),
            "dissolve" => TransitionKind::Dissolve,
            "wipeleft" => TransitionKind::Wipe(Direction::Left),
            "wiperight" => TransitionKind::Wipe(Direction::Right),
            "wipeup" => TransitionKind::Wipe(Direction::Up),
            "wipedown" => TransitionKind::Wipe(Direction::Down),
            "blindshorizontal" | "blinds" => TransitionKind::Blinds(Orientation::Horizontal),
            "blindsvertical" => TransitionKind::Blinds(Orientation::Vertical),
            "circle" => TransitionKind::Circle,
            "diamond" => TransitionKind::Diamond,
            "spiral" => TransitionKind::Spiral,
            "checkerboard" => TransitionKind::Checkerboard,
            "fadeout" => TransitionKind::FadeOut,
            _ => {
                return Err(CoverError::validation(format!(
                    "unknown transition kind '{}'",
                    s.trim()
                )));
            }
        };
        Ok(parsed)
    }
}

impl serde::Serialize for TransitionKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> serde::Deserialize<'de> for TransitionKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TransitionKind::parse_lenient(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in TransitionKind::SELECTABLE {
            assert_eq!(kind.name().parse::<TransitionKind>().unwrap(), kind);
        }
        assert_eq!(
            "fadeOut".parse::<TransitionKind>().unwrap(),
            TransitionKind::FadeOut
        );
    }

    #[test]
    fn aliases_are_accepted() {
        assert_eq!(
            "slide_left".parse::<TransitionKind>().unwrap(),
            TransitionKind::Slide(Direction::Left)
        );
        assert_eq!(
            "WIPE-DOWN".parse::<TransitionKind>().unwrap(),
            TransitionKind::Wipe(Direction::Down)
        );
    }

    #[test]
    fn unknown_is_an_error_but_lenient_falls_back_to_crossfade() {
        assert!("sparkle".parse::<TransitionKind>().is_err());
        assert!("".parse::<TransitionKind>().is_err());
        assert_eq!(
            TransitionKind::parse_lenient("sparkle"),
            TransitionKind::Crossfade
        );
    }

    #[test]
    fn fade_out_is_not_selectable() {
        assert!(!TransitionKind::FadeOut.is_selectable());
        assert!(!TransitionKind::SELECTABLE.contains(&TransitionKind::FadeOut));
    }

    #[test]
    fn serde_uses_camel_case_names() {
        let json = serde_json::to_string(&TransitionKind::Blinds(Orientation::Vertical)).unwrap();
        assert_eq!(json, "\"blindsVertical\"");
        let back: TransitionKind = serde_json::from_str("\"nonsense\"").unwrap();
        assert_eq!(back, TransitionKind::Crossfade);
    }
}
