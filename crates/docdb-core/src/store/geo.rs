use crate::values::{Document, Value};

/// Parameters of a proximity search.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoNear {
    /// `[x, y]`; longitude then latitude in degrees when spherical.
    pub near: (f64, f64),
    pub query: Option<Document>,
    pub limit: Option<usize>,
    pub max_distance: Option<f64>,
    pub spherical: bool,
}

pub const DEFAULT_GEO_LIMIT: usize = 100;

/// Read a legacy coordinate pair: `[x, y]` or a two-field document.
pub fn point(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Array(items) if items.len() >= 2 => Some((items[0].as_f64()?, items[1].as_f64()?)),
        Value::Object(fields) => {
            let mut numbers = fields.values().filter_map(Value::as_f64);
            Some((numbers.next()?, numbers.next()?))
        }
        _ => None,
    }
}

/// Planar distance, or the central angle in radians when `spherical`.
pub fn distance(a: (f64, f64), b: (f64, f64), spherical: bool) -> f64 {
    if !spherical {
        return ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    }
    let (lng1, lat1) = (a.0.to_radians(), a.1.to_radians());
    let (lng2, lat2) = (b.0.to_radians(), b.1.to_radians());
    let h = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lng2 - lng1) / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}
