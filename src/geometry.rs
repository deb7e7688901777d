//! Face region geometry and the orientation frames of the two catalogs.
//!
//! Aperture stores face corners in the coordinate system of the unrotated
//! master, with the y-axis pointing up. Lightroom expects them in its own
//! frame, which depends on how the image is rotated.

/// A normalized point, both coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The four corners of a detected face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    pub bottom_left: Point,
    pub bottom_right: Point,
    pub top_left: Point,
    pub top_right: Point,
}

/// Lightroom's orientation classes, stored as two-letter codes in
/// `Adobe_images.orientation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// `AB`
    Unrotated,
    /// `BC`, rotated 90° clockwise
    Clockwise,
    /// `CD`, rotated 180°
    UpsideDown,
    /// `DA`, rotated 90° counter-clockwise
    CounterClockwise,
    /// Anything else, including NULL. Coordinates pass through untouched.
    Unknown,
}

impl Orientation {
    pub fn from_code(code: &str) -> Self {
        match code {
            "AB" => Orientation::Unrotated,
            "BC" => Orientation::Clockwise,
            "CD" => Orientation::UpsideDown,
            "DA" => Orientation::CounterClockwise,
            _ => Orientation::Unknown,
        }
    }

    /// Map a single point from the Aperture frame into this frame.
    pub fn transform_point(self, p: Point) -> Point {
        match self {
            Orientation::Unrotated => Point::new(p.x, 1.0 - p.y),
            Orientation::Clockwise => Point::new(p.y, p.x),
            Orientation::UpsideDown => Point::new(1.0 - p.x, p.y),
            Orientation::CounterClockwise => Point::new(1.0 - p.y, 1.0 - p.x),
            Orientation::Unknown => p,
        }
    }
}

impl FaceRegion {
    /// Corners keep their labels; only their coordinates move.
    pub fn transformed(&self, orientation: Orientation) -> FaceRegion {
        FaceRegion {
            bottom_left: orientation.transform_point(self.bottom_left),
            bottom_right: orientation.transform_point(self.bottom_right),
            top_left: orientation.transform_point(self.top_left),
            top_right: orientation.transform_point(self.top_right),
        }
    }
}
