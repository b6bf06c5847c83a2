//! String formats applied after type coercion.
//!
//! Formats are checked in a fixed priority order (color, datetime, date,
//! time, iri). The first one the attribute declares decides the outcome.

use std::collections::HashMap;

use chrono::{NaiveTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use thingmesh_core::config::defaults;
use thingmesh_core::timestamp;

/// A string format an attribute may declare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// `#RRGGBB`
    Color,
    /// Full ISO-8601 timestamp
    Datetime,
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM:SS.sssZ`
    Time,
    /// Accepted without validation
    Iri,
    /// A format this engine does not know
    Unknown(String),
}

const PRIORITY: [Format; 5] = [
    Format::Color,
    Format::Datetime,
    Format::Date,
    Format::Time,
    Format::Iri,
];

impl Format {
    pub fn iri(&self) -> String {
        match self {
            Self::Color => "iot:format.color".to_string(),
            Self::Datetime => "iot:format.datetime".to_string(),
            Self::Date => "iot:format.date".to_string(),
            Self::Time => "iot:format.time".to_string(),
            Self::Iri => "iot:format.iri".to_string(),
            Self::Unknown(name) => name.clone(),
        }
    }

    /// Parse a format from its plain name, compact IRI or full IRI.
    pub fn from_name(name: &str) -> Self {
        let compacted = thingmesh_core::vocab::compact(name);
        let local = compacted
            .strip_prefix("iot:format.")
            .unwrap_or(compacted.as_str());
        match local.to_ascii_lowercase().as_str() {
            "color" | "rgb" => Self::Color,
            "datetime" => Self::Datetime,
            "date" => Self::Date,
            "time" => Self::Time,
            "iri" => Self::Iri,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

/// Caller-supplied knobs for [`crate::Attribute::validate`].
///
/// A format that rejects a value yields `None` unless `use_otherwise` is
/// set or a matching `otherwise_*` override is given, in which case the
/// override (or the format's default) is returned instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateOptions {
    pub use_otherwise: bool,
    pub otherwise_rgb: Option<String>,
    pub otherwise_datetime: Option<String>,
    pub otherwise_date: Option<String>,
    pub otherwise_time: Option<String>,
}

impl ValidateOptions {
    pub fn use_otherwise() -> Self {
        Self {
            use_otherwise: true,
            ..Default::default()
        }
    }

    pub fn with_otherwise_rgb(mut self, rgb: impl Into<String>) -> Self {
        self.otherwise_rgb = Some(rgb.into());
        self
    }

    pub fn with_otherwise_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.otherwise_datetime = Some(datetime.into());
        self
    }

    pub fn with_otherwise_date(mut self, date: impl Into<String>) -> Self {
        self.otherwise_date = Some(date.into());
        self
    }

    pub fn with_otherwise_time(mut self, time: impl Into<String>) -> Self {
        self.otherwise_time = Some(time.into());
        self
    }

    fn fallback(&self, supplied: &Option<String>, default: impl FnOnce() -> String) -> Option<Value> {
        match supplied {
            Some(value) => Some(Value::String(value.clone())),
            None if self.use_otherwise => Some(Value::String(default())),
            None => None,
        }
    }
}

/// Apply the highest-priority declared format to `text`.
///
/// Returns `None` when the value must be rejected, including when none of
/// the declared formats is recognised.
pub(crate) fn apply(formats: &[Format], text: &str, options: &ValidateOptions) -> Option<Value> {
    let format = PRIORITY.iter().find(|f| formats.contains(f))?;
    match format {
        Format::Color => color(text)
            .map(Value::String)
            .or_else(|| options.fallback(&options.otherwise_rgb, || defaults::OTHERWISE_RGB.to_string())),
        Format::Datetime => timestamp::parse(text)
            .map(|dt| Value::String(timestamp::to_iso(&dt)))
            .or_else(|| options.fallback(&options.otherwise_datetime, || timestamp::to_iso(&Utc::now()))),
        Format::Date => timestamp::parse(text)
            .map(|dt| Value::String(date_part(&timestamp::to_iso(&dt))))
            .or_else(|| {
                options.fallback(&options.otherwise_date, || date_part(&timestamp::to_iso(&Utc::now())))
            }),
        Format::Time => parse_time(text)
            .map(Value::String)
            .or_else(|| {
                options.fallback(&options.otherwise_time, || time_part(&timestamp::to_iso(&Utc::now())))
            }),
        Format::Iri => Some(Value::String(text.to_string())),
        Format::Unknown(_) => None,
    }
}

fn date_part(iso: &str) -> String {
    iso.split('T').next().unwrap_or(iso).to_string()
}

fn time_part(iso: &str) -> String {
    iso.split_once('T').map_or(iso, |(_, time)| time).to_string()
}

/// A time from either a full timestamp or a bare `HH:MM[:SS[.fff]]`.
fn parse_time(text: &str) -> Option<String> {
    if let Some(dt) = timestamp::parse(text) {
        return Some(time_part(&timestamp::to_iso(&dt)));
    }
    let text = text.trim();
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .map(|time| format!("{}Z", time.format("%H:%M:%S%.3f")))
}

fn is_hex_color(text: &str) -> bool {
    text.len() == 7
        && text.starts_with('#')
        && text[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Normalise a color to `#RRGGBB`, resolving CSS color names.
pub fn color(text: &str) -> Option<String> {
    let upper = text.trim().to_uppercase();
    if is_hex_color(&upper) {
        return Some(upper);
    }
    NAMED_COLORS
        .get(text.trim().to_ascii_lowercase().as_str())
        .map(|hex| hex.to_string())
}

static NAMED_COLORS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| CSS_COLORS.iter().copied().collect());

const CSS_COLORS: &[(&str, &str)] = &[
    ("aliceblue", "#F0F8FF"),
    ("antiquewhite", "#FAEBD7"),
    ("aqua", "#00FFFF"),
    ("aquamarine", "#7FFFD4"),
    ("azure", "#F0FFFF"),
    ("beige", "#F5F5DC"),
    ("bisque", "#FFE4C4"),
    ("black", "#000000"),
    ("blanchedalmond", "#FFEBCD"),
    ("blue", "#0000FF"),
    ("blueviolet", "#8A2BE2"),
    ("brown", "#A52A2A"),
    ("burlywood", "#DEB887"),
    ("cadetblue", "#5F9EA0"),
    ("chartreuse", "#7FFF00"),
    ("chocolate", "#D2691E"),
    ("coral", "#FF7F50"),
    ("cornflowerblue", "#6495ED"),
    ("cornsilk", "#FFF8DC"),
    ("crimson", "#DC143C"),
    ("cyan", "#00FFFF"),
    ("darkblue", "#00008B"),
    ("darkcyan", "#008B8B"),
    ("darkgoldenrod", "#B8860B"),
    ("darkgray", "#A9A9A9"),
    ("darkgreen", "#006400"),
    ("darkgrey", "#A9A9A9"),
    ("darkkhaki", "#BDB76B"),
    ("darkmagenta", "#8B008B"),
    ("darkolivegreen", "#556B2F"),
    ("darkorange", "#FF8C00"),
    ("darkorchid", "#9932CC"),
    ("darkred", "#8B0000"),
    ("darksalmon", "#E9967A"),
    ("darkseagreen", "#8FBC8F"),
    ("darkslateblue", "#483D8B"),
    ("darkslategray", "#2F4F4F"),
    ("darkslategrey", "#2F4F4F"),
    ("darkturquoise", "#00CED1"),
    ("darkviolet", "#9400D3"),
    ("deeppink", "#FF1493"),
    ("deepskyblue", "#00BFFF"),
    ("dimgray", "#696969"),
    ("dimgrey", "#696969"),
    ("dodgerblue", "#1E90FF"),
    ("firebrick", "#B22222"),
    ("floralwhite", "#FFFAF0"),
    ("forestgreen", "#228B22"),
    ("fuchsia", "#FF00FF"),
    ("gainsboro", "#DCDCDC"),
    ("ghostwhite", "#F8F8FF"),
    ("gold", "#FFD700"),
    ("goldenrod", "#DAA520"),
    ("gray", "#808080"),
    ("green", "#008000"),
    ("greenyellow", "#ADFF2F"),
    ("grey", "#808080"),
    ("honeydew", "#F0FFF0"),
    ("hotpink", "#FF69B4"),
    ("indianred", "#CD5C5C"),
    ("indigo", "#4B0082"),
    ("ivory", "#FFFFF0"),
    ("khaki", "#F0E68C"),
    ("lavender", "#E6E6FA"),
    ("lavenderblush", "#FFF0F5"),
    ("lawngreen", "#7CFC00"),
    ("lemonchiffon", "#FFFACD"),
    ("lightblue", "#ADD8E6"),
    ("lightcoral", "#F08080"),
    ("lightcyan", "#E0FFFF"),
    ("lightgoldenrodyellow", "#FAFAD2"),
    ("lightgray", "#D3D3D3"),
    ("lightgreen", "#90EE90"),
    ("lightgrey", "#D3D3D3"),
    ("lightpink", "#FFB6C1"),
    ("lightsalmon", "#FFA07A"),
    ("lightseagreen", "#20B2AA"),
    ("lightskyblue", "#87CEFA"),
    ("lightslategray", "#778899"),
    ("lightslategrey", "#778899"),
    ("lightsteelblue", "#B0C4DE"),
    ("lightyellow", "#FFFFE0"),
    ("lime", "#00FF00"),
    ("limegreen", "#32CD32"),
    ("linen", "#FAF0E6"),
    ("magenta", "#FF00FF"),
    ("maroon", "#800000"),
    ("mediumaquamarine", "#66CDAA"),
    ("mediumblue", "#0000CD"),
    ("mediumorchid", "#BA55D3"),
    ("mediumpurple", "#9370DB"),
    ("mediumseagreen", "#3CB371"),
    ("mediumslateblue", "#7B68EE"),
    ("mediumspringgreen", "#00FA9A"),
    ("mediumturquoise", "#48D1CC"),
    ("mediumvioletred", "#C71585"),
    ("midnightblue", "#191970"),
    ("mintcream", "#F5FFFA"),
    ("mistyrose", "#FFE4E1"),
    ("moccasin", "#FFE4B5"),
    ("navajowhite", "#FFDEAD"),
    ("navy", "#000080"),
    ("oldlace", "#FDF5E6"),
    ("olive", "#808000"),
    ("olivedrab", "#6B8E23"),
    ("orange", "#FFA500"),
    ("orangered", "#FF4500"),
    ("orchid", "#DA70D6"),
    ("palegoldenrod", "#EEE8AA"),
    ("palegreen", "#98FB98"),
    ("paleturquoise", "#AFEEEE"),
    ("palevioletred", "#DB7093"),
    ("papayawhip", "#FFEFD5"),
    ("peachpuff", "#FFDAB9"),
    ("peru", "#CD853F"),
    ("pink", "#FFC0CB"),
    ("plum", "#DDA0DD"),
    ("powderblue", "#B0E0E6"),
    ("purple", "#800080"),
    ("rebeccapurple", "#663399"),
    ("red", "#FF0000"),
    ("rosybrown", "#BC8F8F"),
    ("royalblue", "#4169E1"),
    ("saddlebrown", "#8B4513"),
    ("salmon", "#FA8072"),
    ("sandybrown", "#F4A460"),
    ("seagreen", "#2E8B57"),
    ("seashell", "#FFF5EE"),
    ("sienna", "#A0522D"),
    ("silver", "#C0C0C0"),
    ("skyblue", "#87CEEB"),
    ("slateblue", "#6A5ACD"),
    ("slategray", "#708090"),
    ("slategrey", "#708090"),
    ("snow", "#FFFAFA"),
    ("springgreen", "#00FF7F"),
    ("steelblue", "#4682B4"),
    ("tan", "#D2B48C"),
    ("teal", "#008080"),
    ("thistle", "#D8BFD8"),
    ("tomato", "#FF6347"),
    ("turquoise", "#40E0D0"),
    ("violet", "#EE82EE"),
    ("wheat", "#F5DEB3"),
    ("white", "#FFFFFF"),
    ("whitesmoke", "#F5F5F5"),
    ("yellow", "#FFFF00"),
    ("yellowgreen", "#9ACD32"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(Format::from_name("iot:format.color"), Format::Color);
        assert_eq!(Format::from_name("datetime"), Format::Datetime);
        assert_eq!(
            Format::from_name("https://iotdb.org/pub/iot#format.time"),
            Format::Time
        );
        assert!(matches!(Format::from_name("iot:format.zip"), Format::Unknown(_)));
    }

    #[test]
    fn test_color_normalisation() {
        assert_eq!(color("#ff00ff").as_deref(), Some("#FF00FF"));
        assert_eq!(color("Red").as_deref(), Some("#FF0000"));
        assert_eq!(color("#FFF"), None);
        assert_eq!(color(""), None);
    }

    #[test]
    fn test_priority_order() {
        // color outranks datetime when both are declared
        let formats = vec![Format::Datetime, Format::Color];
        let out = apply(&formats, "blue", &ValidateOptions::default());
        assert_eq!(out, Some(Value::String("#0000FF".into())));
    }

    #[test]
    fn test_time_forms() {
        assert_eq!(parse_time("05:00").as_deref(), Some("05:00:00.000Z"));
        assert_eq!(
            parse_time("2014-02-14T05:06:07.000Z").as_deref(),
            Some("05:06:07.000Z")
        );
        assert_eq!(parse_time("later"), None);
    }

    #[test]
    fn test_unknown_only_rejects() {
        let formats = vec![Format::Unknown("x:zip".into())];
        assert_eq!(apply(&formats, "02139", &ValidateOptions::use_otherwise()), None);
    }
}
