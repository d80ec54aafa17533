//! Zoom level lookup.
//!
//! Entry `i` of the lookup table is the angular span (degrees) visible at
//! zoom level `i`, i.e. `360 / 2^i`.

/// Number of zoom levels, 0 through 19.
pub const ZOOM_LEVELS: usize = 20;

/// Highest zoom level a resource may use.
pub const MAX_ZOOM: u8 = (ZOOM_LEVELS - 1) as u8;

/// Angular span in degrees visible at each zoom level.
pub fn zoom_lookup() -> [f64; ZOOM_LEVELS] {
    std::array::from_fn(|i| 360.0 / f64::from(1u32 << i))
}

/// Zoom level whose visible span most closely matches `span` degrees.
///
/// Walks the table down while `span` is smaller than the level's span, then
/// picks whichever of the two neighbouring levels is numerically closer.
/// Ties go to the lower level.
pub fn min_zoom_for_span(span: f64) -> u8 {
    let lookup = zoom_lookup();
    let last = ZOOM_LEVELS - 1;

    let mut i = 0;
    while span < lookup[i] && i < last {
        i += 1;
    }

    if i == 0 {
        return 0;
    }

    if (span - lookup[i]).abs() < (span - lookup[i - 1]).abs() {
        i as u8
    } else {
        (i - 1) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table() {
        let lookup = zoom_lookup();
        assert_eq!(lookup[0], 360.0);
        assert_eq!(lookup[8], 1.40625);
        assert_eq!(lookup[9], 0.703125);
        assert_eq!(lookup[19], 360.0 / 524288.0);
    }

    #[test]
    fn test_ten_degrees() {
        // 11.25 is closer to 10 than 5.625
        assert_eq!(min_zoom_for_span(10.0), 5);
    }

    #[test]
    fn test_one_degree() {
        assert_eq!(min_zoom_for_span(1.0), 9);
    }

    #[test]
    fn test_whole_world_and_beyond() {
        assert_eq!(min_zoom_for_span(360.0), 0);
        assert_eq!(min_zoom_for_span(720.0), 0);
    }

    #[test]
    fn test_tie_goes_to_lower_level() {
        // Midpoint between 45 (level 3) and 22.5 (level 4)
        assert_eq!(min_zoom_for_span(33.75), 3);
    }

    #[test]
    fn test_nan_span_does_not_panic() {
        assert_eq!(min_zoom_for_span(f64::NAN), 0);
    }
}
