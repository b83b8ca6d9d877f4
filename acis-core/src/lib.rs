pub mod entity;
pub mod graph;
pub mod registry;
pub mod value;

pub mod geometry {
    use glam::{DMat4, DVec3};
    use serde::{Deserialize, Serialize};

    /// 判定两个浮点数近似相等时使用的绝对容差。
    pub const ABS_TOL: f64 = 1e-9;

    /// 三维点，内部以 `glam::DVec3` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        pub const ORIGIN: Point3 = Point3(DVec3::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn from_array(coords: [f64; 3]) -> Self {
            Self(DVec3::from_array(coords))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn to_array(self) -> [f64; 3] {
            self.0.to_array()
        }

        #[inline]
        pub fn is_close(self, other: Point3) -> bool {
            self.0.abs_diff_eq(other.0, ABS_TOL)
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 三维向量，用于法向、方向等几何参数。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        pub const X: Vector3 = Vector3(DVec3::X);
        pub const Y: Vector3 = Vector3(DVec3::Y);
        pub const Z: Vector3 = Vector3(DVec3::Z);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn from_array(coords: [f64; 3]) -> Self {
            Self(DVec3::from_array(coords))
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn to_array(self) -> [f64; 3] {
            self.0.to_array()
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        #[inline]
        pub fn dot(self, other: Vector3) -> f64 {
            self.0.dot(other.0)
        }

        #[inline]
        pub fn cross(self, other: Vector3) -> Vector3 {
            Self(self.0.cross(other.0))
        }

        #[inline]
        pub fn is_close(self, other: Vector3) -> bool {
            self.0.abs_diff_eq(other.0, ABS_TOL)
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 参数区间的一端：ACIS 以 `I` 表示无界，以 `F <值>` 表示有界。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub enum Bound {
        Infinite,
        Finite(f64),
    }

    impl Bound {
        #[inline]
        pub fn is_infinite(self) -> bool {
            matches!(self, Bound::Infinite)
        }

        #[inline]
        pub fn value(self) -> Option<f64> {
            match self {
                Bound::Infinite => None,
                Bound::Finite(value) => Some(value),
            }
        }
    }

    impl Default for Bound {
        fn default() -> Self {
            Bound::Infinite
        }
    }

    /// 4×4 仿射矩阵，采用行向量约定：前三行为旋转/缩放，第 3 行为平移。
    ///
    /// 内部以 `glam::DMat4` 存储，矩阵的第 i 行对应 glam 的第 i 列，
    /// 因而 `transform_point3` 与行向量乘法 `p * M` 等价。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Matrix44(pub DMat4);

    impl Matrix44 {
        pub const IDENTITY: Matrix44 = Matrix44(DMat4::IDENTITY);

        #[inline]
        pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
            Self(DMat4::from_cols_array_2d(&rows))
        }

        #[inline]
        pub fn row(&self, index: usize) -> [f64; 4] {
            self.0.col(index).to_array()
        }

        #[inline]
        pub fn rows(&self) -> [[f64; 4]; 4] {
            self.0.to_cols_array_2d()
        }

        #[inline]
        pub fn translation(&self) -> Vector3 {
            Vector3(self.0.w_axis.truncate())
        }

        #[inline]
        pub fn transform_point(&self, point: Point3) -> Point3 {
            Point3(self.0.transform_point3(point.0))
        }

        #[inline]
        pub fn transform_direction(&self, direction: Vector3) -> Vector3 {
            Vector3(self.0.transform_vector3(direction.0))
        }

        #[inline]
        pub fn determinant(&self) -> f64 {
            self.0.determinant()
        }

        pub fn is_close(&self, other: &Matrix44) -> bool {
            self.0.abs_diff_eq(other.0, ABS_TOL)
        }
    }

    impl Default for Matrix44 {
        fn default() -> Self {
            Self::IDENTITY
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn rows_follow_row_vector_convention() {
            let matrix = Matrix44::from_rows([
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [388.5, 388.5, 388.5, 1.0],
            ]);
            assert_eq!(matrix.row(3), [388.5, 388.5, 388.5, 1.0]);
            let moved = matrix.transform_point(Point3::new(1.0, 2.0, 3.0));
            assert!(moved.is_close(Point3::new(389.5, 390.5, 391.5)));
            let dir = matrix.transform_direction(Vector3::X);
            assert!(dir.is_close(Vector3::X));
        }

        #[test]
        fn bound_reports_finite_value() {
            assert!(Bound::Infinite.is_infinite());
            assert_eq!(Bound::Finite(2.5).value(), Some(2.5));
            assert_eq!(Bound::default(), Bound::Infinite);
        }
    }
}
