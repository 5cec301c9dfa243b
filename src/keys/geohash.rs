//! Base32 geohash codec.

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";
pub const MAX_PRECISION: usize = 12;
pub const DEFAULT_PRECISION: usize = 6;

/// Encodes a coordinate. Returns `None` for out-of-range input or precision.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Option<String> {
    if !(-90.0..=90.0).contains(&lat)
        || !(-180.0..=180.0).contains(&lon)
        || precision == 0
        || precision > MAX_PRECISION
    {
        return None;
    }

    let mut lat_range = (-90.0, 90.0);
    let mut lon_range = (-180.0, 180.0);
    let mut hash = String::with_capacity(precision);
    let mut bits = 0usize;
    let mut bit_count = 0;
    let mut even = true;

    while hash.len() < precision {
        let (range, value) = if even {
            (&mut lon_range, lon)
        } else {
            (&mut lat_range, lat)
        };
        let mid = (range.0 + range.1) / 2.0;
        if value >= mid {
            bits = (bits << 1) | 1;
            range.0 = mid;
        } else {
            bits <<= 1;
            range.1 = mid;
        }

        even = !even;
        bit_count += 1;
        if bit_count == 5 {
            hash.push(BASE32[bits] as char);
            bits = 0;
            bit_count = 0;
        }
    }

    Some(hash)
}

/// Bounding box `(min_lat, min_lon, max_lat, max_lon)` of a geohash cell.
pub fn decode_bbox(hash: &str) -> Option<(f64, f64, f64, f64)> {
    if !is_valid(hash) {
        return None;
    }

    let mut lat_range = (-90.0, 90.0);
    let mut lon_range = (-180.0, 180.0);
    let mut even = true;

    for c in hash.bytes() {
        let index = BASE32.iter().position(|b| *b == c.to_ascii_lowercase())?;
        for shift in (0..5).rev() {
            let range = if even { &mut lon_range } else { &mut lat_range };
            let mid = (range.0 + range.1) / 2.0;
            if (index >> shift) & 1 == 1 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            even = !even;
        }
    }

    Some((lat_range.0, lon_range.0, lat_range.1, lon_range.1))
}

/// Centre `(lat, lon)` of a geohash cell.
pub fn decode(hash: &str) -> Option<(f64, f64)> {
    let (min_lat, min_lon, max_lat, max_lon) = decode_bbox(hash)?;
    Some(((min_lat + max_lat) / 2.0, (min_lon + max_lon) / 2.0))
}

pub fn is_valid(hash: &str) -> bool {
    !hash.is_empty()
        && hash.len() <= MAX_PRECISION
        && hash
            .bytes()
            .all(|c| BASE32.contains(&c.to_ascii_lowercase()))
}
