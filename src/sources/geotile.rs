//! Web-mercator ("slippy") tile encoding of geo points at a fixed zoom.
//!
//! A tile id packs zoom, x and y into one integer: `(zoom << 58) | (x << 29)
//! | y`. At a fixed zoom, numeric ordering of ids orders tiles by x, then y.

use std::f64::consts::PI;

/// Largest zoom the 29-bit x/y layout can address.
pub(crate) const MAX_ZOOM: u8 = 29;

/// Web-mercator latitude bound; poles are clamped onto the edge tiles.
const MAX_LAT: f64 = 85.051_128_779_806_6;

const FIELD_MASK: i64 = (1 << 29) - 1;

/// Encodes WGS84 `(lat, lon)` degrees into a tile id at `zoom`.
pub(crate) fn encode(lat: f64, lon: f64, zoom: u8) -> i64 {
    let tiles = (1u64 << zoom) as f64;
    let x = ((lon + 180.0) / 360.0 * tiles).floor();
    let lat_rad = lat.clamp(-MAX_LAT, MAX_LAT).to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * tiles).floor();
    let max_index = (1i64 << zoom) - 1;
    let x = (x as i64).clamp(0, max_index);
    let y = (y as i64).clamp(0, max_index);
    (i64::from(zoom) << 58) | (x << 29) | y
}

/// Splits a tile id into `(zoom, x, y)`.
pub(crate) fn split(id: i64) -> (u8, i64, i64) {
    ((id >> 58) as u8, (id >> 29) & FIELD_MASK, id & FIELD_MASK)
}

/// Formats a tile id as `"zoom/x/y"`.
pub(crate) fn format(id: i64) -> String {
    let (zoom, x, y) = split(id);
    format!("{zoom}/{x}/{y}")
}

/// Parses a `"zoom/x/y"` tile address back into an id. Errors are returned
/// as plain detail strings for the after-key codec to wrap.
pub(crate) fn parse(addr: &str) -> Result<i64, String> {
    let mut parts = addr.splitn(3, '/');
    let mut next_number = |what: &str| -> Result<i64, String> {
        parts
            .next()
            .ok_or_else(|| format!("invalid tile address '{addr}', expected 'zoom/x/y'"))?
            .parse::<i64>()
            .map_err(|_err| format!("invalid {what} in tile address '{addr}'"))
    };
    let zoom = next_number("zoom")?;
    let x = next_number("x")?;
    let y = next_number("y")?;
    if zoom < 0 || zoom > i64::from(MAX_ZOOM) {
        return Err(format!("zoom {zoom} is out of range 0..={MAX_ZOOM}"));
    }
    let max_index = (1i64 << zoom) - 1;
    if x < 0 || x > max_index || y < 0 || y > max_index {
        return Err(format!(
            "tile {x}/{y} is out of range for zoom {zoom} (0..={max_index})"
        ));
    }
    Ok((zoom << 58) | (x << 29) | y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_tiles() {
        // London at zoom 7 is tile 63/42
        assert_eq!(format(encode(51.5074, -0.1278, 7)), "7/63/42");
        // the null island sits on the first tile east of the antimeridian
        // column boundary
        assert_eq!(format(encode(0.0, 0.0, 7)), "7/64/64");
        assert_eq!(format(encode(0.0, 0.0, 0)), "0/0/0");
    }

    #[test]
    fn test_encode_clamps_poles_and_antimeridian() {
        assert_eq!(format(encode(90.0, 0.0, 7)), "7/64/0");
        assert_eq!(format(encode(-90.0, 0.0, 7)), "7/64/127");
        assert_eq!(format(encode(0.0, 180.0, 7)), "7/127/64");
        assert_eq!(format(encode(0.0, -180.0, 7)), "7/0/64");
    }

    #[test]
    fn test_ids_order_by_x_then_y_at_fixed_zoom() {
        let west = encode(10.0, -120.0, 7);
        let east = encode(10.0, 120.0, 7);
        assert!(west < east);
        let north = encode(60.0, 10.0, 7);
        let south = encode(-60.0, 10.0, 7);
        assert!(north < south);
    }

    #[test]
    fn test_parse_roundtrip() {
        for addr in ["7/63/42", "0/0/0", "29/1/536870911"] {
            let id = parse(addr).unwrap();
            assert_eq!(format(id), addr);
        }
    }

    #[test]
    fn test_parse_rejects_malformed_addresses() {
        assert!(parse("7/63").is_err());
        assert!(parse("7/63/a").is_err());
        assert!(parse("30/0/0").is_err());
        assert!(parse("3/9/0").is_err());
        assert!(parse("7/-1/0").is_err());
    }
}
