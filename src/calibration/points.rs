use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::CalibrationPoint;
use crate::positioning::ScreenGeometry;

pub const GRID_POINT_COUNT: usize = 9;

/// 3x3 grid in screen pixels, column by column from the left edge.
/// The outer rows and columns sit `buffer_pct * height` in from the edges.
pub fn grid_points(screen: &ScreenGeometry, buffer_pct: f64) -> Vec<CalibrationPoint> {
    let width = screen.width_f();
    let height = screen.height_f();
    let buffer = height * buffer_pct;

    let columns = [buffer, width / 2.0, width - buffer];
    let rows = [buffer, height / 2.0, height - buffer];

    columns
        .iter()
        .flat_map(|&x| rows.iter().map(move |&y| CalibrationPoint::new(x, y)))
        .collect()
}

/// Grid points in a uniformly random presentation order.
pub fn generate_points<R: Rng + ?Sized>(
    screen: &ScreenGeometry,
    buffer_pct: f64,
    rng: &mut R,
) -> Vec<CalibrationPoint> {
    let mut points = grid_points(screen, buffer_pct);
    points.shuffle(rng);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted(mut points: Vec<CalibrationPoint>) -> Vec<(i32, i32)> {
        let mut pixels: Vec<_> = points.drain(..).map(|p| p.pixel()).collect();
        pixels.sort();
        pixels
    }

    #[test]
    fn grid_is_inset_by_buffer() {
        let points = grid_points(&ScreenGeometry::new(1920, 1080), 0.15);
        assert_eq!(points.len(), GRID_POINT_COUNT);
        assert_eq!(points[0].pixel(), (162, 162));
        assert_eq!(points[1].pixel(), (162, 540));
        assert_eq!(points[4].pixel(), (960, 540));
        assert_eq!(points[8].pixel(), (1758, 918));
    }

    #[test]
    fn generated_points_are_unique() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pixels = sorted(generate_points(&ScreenGeometry::default(), 0.15, &mut rng));
        pixels.dedup();
        assert_eq!(pixels.len(), GRID_POINT_COUNT);
    }

    #[test]
    fn shuffle_preserves_the_multiset() {
        let screen = ScreenGeometry::default();
        let reference = sorted(grid_points(&screen, 0.15));
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let generated = generate_points(&screen, 0.15, &mut rng);
            assert_eq!(generated.len(), GRID_POINT_COUNT);
            assert_eq!(sorted(generated), reference);
        }
    }
}
