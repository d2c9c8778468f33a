use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use crate::models::error::ModelError;

/// 1秒あたりのティック数
pub const TICKS_PER_SECOND: u32 = 60;

/// 2次元ワールド座標（ピクセル単位）
///
/// 比較は厳密な浮動小数点一致で行います。レイキャストの
/// 「遮蔽なし」判定は `raycast(a, b, walls) == b` で表現されます。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 2点間の二乗距離
    pub fn distance_sq(&self, other: &Point) -> f32 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    /// 2点間の距離
    pub fn distance(&self, other: &Point) -> f32 {
        self.distance_sq(other).sqrt()
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f32> for Point {
    type Output = Self;

    fn mul(self, scalar: f32) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

/// 軸平行な矩形領域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// 点が矩形の内部（境界を含まない）にあるか
    pub fn contains(&self, point: &Point) -> bool {
        point.x > self.x && point.x < self.x + self.w && point.y > self.y && point.y < self.y + self.h
    }
}

/// 壁のデッドゾーンを張る側
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadSide {
    Up,
    Down,
    Left,
    Right,
    /// 壁の向きに直交する両側
    Both,
}

impl FromStr for DeadSide {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(DeadSide::Up),
            "down" => Ok(DeadSide::Down),
            "left" => Ok(DeadSide::Left),
            "right" => Ok(DeadSide::Right),
            "both" => Ok(DeadSide::Both),
            _ => Err(ModelError::InvalidDeadSide(s.to_string())),
        }
    }
}

/// 壁（線分）
///
/// 端点に加えて直線 `ax + by + c = 0` の係数を保持し、
/// レイとの交差判定の分母計算に使います。
#[derive(Debug, Clone, PartialEq)]
pub struct Wall {
    pub start: Point,
    pub end: Point,
    pub a: f32,
    pub b: f32,
    pub c: f32,
    /// エージェントを配置してはならない領域
    pub deadzone: Option<Rect>,
}

impl Wall {
    pub fn new(start: Point, end: Point) -> Self {
        let a = end.y - start.y;
        let b = start.x - end.x;
        let c = -(a * start.x + b * start.y);
        Self {
            start,
            end,
            a,
            b,
            c,
            deadzone: None,
        }
    }

    /// 指定した側にタイル1枚分のデッドゾーンを設定
    pub fn with_deadzone(mut self, side: DeadSide, tile_size: f32) -> Self {
        let min_x = self.start.x.min(self.end.x);
        let max_x = self.start.x.max(self.end.x);
        let min_y = self.start.y.min(self.end.y);
        let max_y = self.start.y.max(self.end.y);

        let horizontal = (max_x - min_x) >= (max_y - min_y);
        let (w, h) = (max_x - min_x, max_y - min_y);
        let zone = match side {
            DeadSide::Up => Rect::new(min_x, min_y - tile_size, w, h + tile_size),
            DeadSide::Down => Rect::new(min_x, min_y, w, h + tile_size),
            DeadSide::Left => Rect::new(min_x - tile_size, min_y, w + tile_size, h),
            DeadSide::Right => Rect::new(min_x, min_y, w + tile_size, h),
            DeadSide::Both if horizontal => Rect::new(min_x, min_y - tile_size, w, h + 2.0 * tile_size),
            DeadSide::Both => Rect::new(min_x - tile_size, min_y, w + 2.0 * tile_size, h),
        };
        self.deadzone = Some(zone);
        self
    }

    /// 点が符号付きでどちら側にあるか（`ax + by + c` の値）
    pub fn side_of(&self, point: &Point) -> f32 {
        self.a * point.x + self.b * point.y + self.c
    }

    pub fn is_in_deadzone(&self, point: &Point) -> bool {
        self.deadzone.is_some_and(|zone| zone.contains(point))
    }
}

/// タイルグリッド上のセル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub col: i32,
    pub row: i32,
}

impl GridCell {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// セル間の二乗距離（セル単位）
    pub fn distance_sq(&self, other: &GridCell) -> i64 {
        let dc = i64::from(self.col - other.col);
        let dr = i64::from(self.row - other.row);
        dc * dc + dr * dr
    }
}

/// シミュレーション全体で不変のコンテキスト
///
/// タイルサイズ、ワールドの大きさ、1日の長さを保持します。
/// シナリオから一度だけ構築し、各コンポーネントへ参照で渡します。
#[derive(Debug, Clone, PartialEq)]
pub struct SimContext {
    /// タイル1枚の一辺（ピクセル）
    pub tile_size: f32,
    /// グリッドの列数
    pub width_tiles: u32,
    /// グリッドの行数
    pub height_tiles: u32,
    /// 1日あたりのティック数
    pub day_ticks: u64,
}

impl SimContext {
    pub fn new(tile_size: f32, width_tiles: u32, height_tiles: u32, day_duration_min: f64) -> Self {
        let ticks_per_minute = f64::from(TICKS_PER_SECOND) * 60.0;
        Self {
            tile_size,
            width_tiles,
            height_tiles,
            day_ticks: (day_duration_min * ticks_per_minute).round() as u64,
        }
    }

    pub fn half_tile(&self) -> f32 {
        self.tile_size / 2.0
    }

    /// ワールドの幅（ピクセル）
    pub fn width(&self) -> f32 {
        self.width_tiles as f32 * self.tile_size
    }

    /// ワールドの高さ（ピクセル）
    pub fn height(&self) -> f32 {
        self.height_tiles as f32 * self.tile_size
    }

    /// ワールド座標からグリッドセルへの変換（切り捨て）
    pub fn to_grid(&self, point: &Point) -> GridCell {
        GridCell::new(
            (point.x / self.tile_size).floor() as i32,
            (point.y / self.tile_size).floor() as i32,
        )
    }

    /// グリッドセルの中心のワールド座標
    pub fn to_world(&self, cell: &GridCell) -> Point {
        Point::new(
            cell.col as f32 * self.tile_size + self.half_tile(),
            cell.row as f32 * self.tile_size + self.half_tile(),
        )
    }

    /// 点を含むタイルの中心
    pub fn tile_center(&self, point: &Point) -> Point {
        self.to_world(&self.to_grid(point))
    }

    pub fn in_bounds(&self, cell: &GridCell) -> bool {
        cell.col >= 0 && cell.row >= 0 && (cell.col as u32) < self.width_tiles && (cell.row as u32) < self.height_tiles
    }

    /// タイル単位の座標をワールド座標へ
    pub fn tiles_to_world(&self, x: f32, y: f32) -> Point {
        Point::new(x * self.tile_size, y * self.tile_size)
    }

    /// 点をワールドの内側（半タイルの余白付き）に収める
    pub fn constrain(&self, point: Point) -> Point {
        let half = self.half_tile();
        Point::new(
            point.x.clamp(half, (self.width() - half).max(half)),
            point.y.clamp(half, (self.height() - half).max(half)),
        )
    }

    /// 秒をティックへ変換（負値は0）
    pub fn seconds_to_ticks(seconds: f32) -> u32 {
        (seconds * TICKS_PER_SECOND as f32).round().max(0.0) as u32
    }
}

/// ガードの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuardId(pub u32);

/// ガードが検査対象として参照する移動体（所有しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRef {
    Employee(usize),
    Attacker,
}

/// ドア侵入の成功・失敗回数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoorStats {
    pub successes: u32,
    pub failures: u32,
}

impl DoorStats {
    pub fn attempts(&self) -> u32 {
        self.successes + self.failures
    }
}

impl Add for DoorStats {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self {
            successes: self.successes + other.successes,
            failures: self.failures + other.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SimContext {
        SimContext::new(10.0, 20, 10, 1.0)
    }

    #[test]
    fn test_grid_world_mapping() {
        let ctx = context();
        let cell = ctx.to_grid(&Point::new(25.0, 39.9));
        assert_eq!(cell, GridCell::new(2, 3));
        assert_eq!(ctx.to_world(&cell), Point::new(25.0, 35.0));
        assert_eq!(ctx.to_grid(&ctx.to_world(&cell)), cell);
    }

    #[test]
    fn test_bounds_and_day_ticks() {
        let ctx = context();
        assert!(ctx.in_bounds(&GridCell::new(0, 0)));
        assert!(ctx.in_bounds(&GridCell::new(19, 9)));
        assert!(!ctx.in_bounds(&GridCell::new(20, 0)));
        assert!(!ctx.in_bounds(&GridCell::new(0, -1)));
        assert_eq!(ctx.day_ticks, 3600);
    }

    #[test]
    fn test_constrain_keeps_points_inside() {
        let ctx = context();
        assert_eq!(ctx.constrain(Point::new(-4.0, 500.0)), Point::new(5.0, 95.0));
    }

    #[test]
    fn test_wall_coefficients() {
        let wall = Wall::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert_eq!(wall.side_of(&Point::new(5.0, 0.0)), 0.0);
        assert!(wall.side_of(&Point::new(5.0, 3.0)) * wall.side_of(&Point::new(5.0, -3.0)) < 0.0);
    }

    #[test]
    fn test_deadzone_sides() {
        let wall = Wall::new(Point::new(0.0, 50.0), Point::new(100.0, 50.0)).with_deadzone(DeadSide::Up, 10.0);
        assert!(wall.is_in_deadzone(&Point::new(50.0, 45.0)));
        assert!(!wall.is_in_deadzone(&Point::new(50.0, 55.0)));

        let both = Wall::new(Point::new(0.0, 50.0), Point::new(100.0, 50.0)).with_deadzone(DeadSide::Both, 10.0);
        assert!(both.is_in_deadzone(&Point::new(50.0, 45.0)));
        assert!(both.is_in_deadzone(&Point::new(50.0, 55.0)));

        assert!("sideways".parse::<DeadSide>().is_err());
    }
}
