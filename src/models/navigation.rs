//! # Navigation モジュール
//!
//! 壁セグメントによる見通し判定（レイキャスト）と、タイルグリッド上の
//! A*経路探索を提供します。どちらも所有権を持たない純粋関数で、
//! 全ての移動体から利用されます。
//!
//! ## 見通し判定
//!
//! `raycast(a, b, walls) == b` のとき、`b` は `a` から見えています。
//!
//! ## 経路探索
//!
//! - コストは `f = g + h`（どちらもセル単位の二乗ユークリッド距離）
//! - オープンリストは線形走査で最小の `f` を選択（同値は先に見つかった方）
//! - 隣接8セルへの展開時、セル中心間のレイが壁に遮られる場合はスキップ
//! - 到達不能な場合は空の経路を返す

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::models::common::{GridCell, Point, SimContext, Wall};

/// ほぼ平行とみなす分母の閾値
const PARALLEL_EPSILON: f32 = 0.01;

/// 経路復元の最大ステップ数
pub const MAX_PATH_STEPS: usize = 100;

/// ランダム地点の棄却サンプリング上限
const FREE_POINT_ATTEMPTS: usize = 100;

/// 起点から終点へのレイを壁に対して判定し、最も近い遮蔽点を返します
///
/// # 引数
///
/// * `origin` - レイの起点
/// * `destination` - レイの終点
/// * `walls` - 判定対象の壁
///
/// # 戻り値
///
/// 起点に最も近い交点。遮る壁がなければ `destination` をそのまま返す
pub fn raycast(origin: Point, destination: Point, walls: &[Wall]) -> Point {
    let ray_a = destination.y - origin.y;
    let ray_b = origin.x - destination.x;

    let mut nearest = destination;
    let mut nearest_u = f32::INFINITY;

    for wall in walls {
        let den = wall.a * ray_b - ray_a * wall.b;
        if den.abs() < PARALLEL_EPSILON {
            continue;
        }

        // t: 壁上のパラメータ, u: レイ上のパラメータ
        let t = ((wall.start.x - origin.x) * (origin.y - destination.y)
            - (wall.start.y - origin.y) * (origin.x - destination.x))
            / den;
        let u = -((wall.start.x - wall.end.x) * (wall.start.y - origin.y)
            - (wall.start.y - wall.end.y) * (wall.start.x - origin.x))
            / den;

        if !(0.0..=1.0).contains(&t) || u <= 0.0 || u >= 1.0 {
            continue;
        }

        if u < nearest_u {
            nearest_u = u;
            nearest = origin + (destination - origin) * u;
        }
    }

    nearest
}

/// `to` が `from` から見えるか
pub fn is_visible(from: Point, to: Point, walls: &[Wall]) -> bool {
    raycast(from, to, walls) == to
}

/// 経路探索中のセル情報（1回の探索でのみ使用）
#[derive(Debug, Clone, Copy)]
struct PathNode {
    parent: Option<GridCell>,
    g: i64,
    f: i64,
}

/// グリッドA*による経路探索
///
/// # 引数
///
/// * `start` - 開始地点（ワールド座標）
/// * `goal` - 目標地点（ワールド座標）
/// * `walls` - 通過できない壁
/// * `ctx` - グリッド寸法を持つコンテキスト
///
/// # 戻り値
///
/// 開始セルから目標セルまでのタイル中心の列。到達不能、または
/// 目標がグリッド外の場合は空
pub fn find_path(start: Point, goal: Point, walls: &[Wall], ctx: &SimContext) -> Vec<Point> {
    let start_cell = ctx.to_grid(&start);
    let goal_cell = ctx.to_grid(&goal);

    if !ctx.in_bounds(&goal_cell) || !ctx.in_bounds(&start_cell) {
        return Vec::new();
    }

    let mut nodes: HashMap<GridCell, PathNode> = HashMap::new();
    let mut closed: HashSet<GridCell> = HashSet::new();
    let mut open: Vec<GridCell> = vec![start_cell];

    let h = start_cell.distance_sq(&goal_cell);
    nodes.insert(start_cell, PathNode { parent: None, g: 0, f: h });

    while !open.is_empty() {
        let index = lowest_cost(&open, &nodes);
        let current = open.remove(index);

        if current == goal_cell {
            return reconstruct(&nodes, current, ctx);
        }

        closed.insert(current);

        let Some(current_g) = nodes.get(&current).map(|node| node.g) else {
            continue;
        };
        let from = ctx.to_world(&current);

        for neighbor in neighbors(current) {
            if closed.contains(&neighbor) || !ctx.in_bounds(&neighbor) {
                continue;
            }

            let to = ctx.to_world(&neighbor);
            if !is_visible(from, to, walls) {
                continue;
            }

            let g = current_g + current.distance_sq(&neighbor);
            let f = g + neighbor.distance_sq(&goal_cell);

            if nodes.get(&neighbor).is_some_and(|existing| f >= existing.f) {
                continue;
            }

            nodes.insert(neighbor, PathNode { parent: Some(current), g, f });

            if neighbor == goal_cell {
                return reconstruct(&nodes, neighbor, ctx);
            }

            if !open.contains(&neighbor) {
                open.push(neighbor);
            }
        }
    }

    Vec::new()
}

fn lowest_cost(open: &[GridCell], nodes: &HashMap<GridCell, PathNode>) -> usize {
    let mut best_index = 0;
    let mut best_f = i64::MAX;

    for (index, cell) in open.iter().enumerate() {
        let f = nodes.get(cell).map_or(i64::MAX, |node| node.f);
        if f < best_f {
            best_f = f;
            best_index = index;
        }
    }

    best_index
}

fn neighbors(cell: GridCell) -> impl Iterator<Item = GridCell> {
    const OFFSETS: [(i32, i32); 8] = [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)];

    OFFSETS
        .into_iter()
        .map(move |(dc, dr)| GridCell::new(cell.col + dc, cell.row + dr))
}

fn reconstruct(nodes: &HashMap<GridCell, PathNode>, goal: GridCell, ctx: &SimContext) -> Vec<Point> {
    let mut path = Vec::new();
    let mut cursor = Some(goal);

    while let Some(cell) = cursor {
        path.push(ctx.to_world(&cell));
        cursor = nodes.get(&cell).and_then(|node| node.parent);
    }

    // 上限を超える経路は開始側を残して切り詰める
    path.reverse();
    path.truncate(MAX_PATH_STEPS);
    path
}

/// デッドゾーン外のランダムな地点
pub fn random_free_point<R: Rng + ?Sized>(ctx: &SimContext, walls: &[Wall], rng: &mut R) -> Option<Point> {
    random_point_where(ctx, walls, rng, |_| true)
}

/// デッドゾーン外で、かつ条件を満たすランダムな地点
///
/// 棄却サンプリングで一定回数試行し、見つからなければ `None` を返します。
pub fn random_point_where<R, F>(ctx: &SimContext, walls: &[Wall], rng: &mut R, accept: F) -> Option<Point>
where
    R: Rng + ?Sized,
    F: Fn(&Point) -> bool,
{
    for _ in 0..FREE_POINT_ATTEMPTS {
        let point = Point::new(rng.gen_range(0.0..ctx.width()), rng.gen_range(0.0..ctx.height()));

        if walls.iter().any(|wall| wall.is_in_deadzone(&point)) {
            continue;
        }

        if accept(&point) {
            return Some(point);
        }
    }

    None
}

/// エージェントの初期配置地点
///
/// 空き地点が見つからない場合はワールド中央のタイル中心に置きます。
pub fn spawn_point<R: Rng + ?Sized>(ctx: &SimContext, walls: &[Wall], rng: &mut R) -> Point {
    random_free_point(ctx, walls, rng)
        .unwrap_or_else(|| ctx.tile_center(&Point::new(ctx.width() / 2.0, ctx.height() / 2.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::DeadSide;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn context() -> SimContext {
        SimContext::new(10.0, 10, 10, 1.0)
    }

    fn wall(x1: f32, y1: f32, x2: f32, y2: f32) -> Wall {
        Wall::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    fn assert_path_is_clear(path: &[Point], walls: &[Wall]) {
        for pair in path.windows(2) {
            assert_eq!(raycast(pair[0], pair[1], walls), pair[1], "経路が壁を横切っています: {:?}", pair);
        }
    }

    #[test]
    fn test_raycast_without_walls() {
        let a = Point::new(3.0, 4.0);
        let b = Point::new(-12.5, 80.0);
        assert_eq!(raycast(a, b, &[]), b);
    }

    #[test]
    fn test_raycast_hits_wall() {
        let walls = vec![wall(50.0, 0.0, 50.0, 100.0)];
        let hit = raycast(Point::new(0.0, 50.0), Point::new(100.0, 50.0), &walls);
        assert!((hit.x - 50.0).abs() < 1e-4);
        assert!((hit.y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_raycast_stops_short_of_wall() {
        let walls = vec![wall(50.0, 0.0, 50.0, 100.0)];
        let destination = Point::new(40.0, 50.0);
        assert_eq!(raycast(Point::new(0.0, 50.0), destination, &walls), destination);
    }

    #[test]
    fn test_raycast_misses_wall_segment() {
        let walls = vec![wall(50.0, 0.0, 50.0, 20.0)];
        let destination = Point::new(100.0, 50.0);
        assert_eq!(raycast(Point::new(0.0, 50.0), destination, &walls), destination);
    }

    #[test]
    fn test_raycast_skips_parallel_walls() {
        let walls = vec![wall(0.0, 50.0, 100.0, 50.0)];
        let destination = Point::new(100.0, 50.0);
        assert_eq!(raycast(Point::new(0.0, 50.0), destination, &walls), destination);
    }

    #[test]
    fn test_raycast_returns_nearest_hit() {
        let walls = vec![wall(70.0, 0.0, 70.0, 100.0), wall(30.0, 0.0, 30.0, 100.0)];
        let hit = raycast(Point::new(0.0, 50.0), Point::new(100.0, 50.0), &walls);
        assert!((hit.x - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_find_path_trivial() {
        let ctx = context();
        let p = Point::new(33.0, 47.0);
        assert_eq!(find_path(p, p, &[], &ctx), vec![Point::new(35.0, 45.0)]);
    }

    #[test]
    fn test_find_path_goal_out_of_bounds() {
        let ctx = context();
        assert!(find_path(Point::new(5.0, 5.0), Point::new(150.0, 5.0), &[], &ctx).is_empty());
        assert!(find_path(Point::new(5.0, 5.0), Point::new(5.0, -1.0), &[], &ctx).is_empty());
    }

    #[test]
    fn test_find_path_open_field() {
        let ctx = context();
        let path = find_path(Point::new(5.0, 5.0), Point::new(95.0, 5.0), &[], &ctx);
        assert_eq!(path.first(), Some(&Point::new(5.0, 5.0)));
        assert_eq!(path.last(), Some(&Point::new(95.0, 5.0)));
        assert_eq!(path.len(), 10);
    }

    #[test]
    fn test_find_path_goes_around_wall() {
        let ctx = context();
        let walls = vec![wall(50.0, 0.0, 50.0, 70.0)];
        let start = Point::new(15.0, 15.0);
        let goal = Point::new(85.0, 15.0);

        let path = find_path(start, goal, &walls, &ctx);

        assert!(!path.is_empty());
        assert_eq!(path.first(), Some(&ctx.tile_center(&start)));
        assert_eq!(path.last(), Some(&ctx.tile_center(&goal)));
        assert!(path.iter().any(|p| p.y > 70.0));
        assert_path_is_clear(&path, &walls);
    }

    #[test]
    fn test_long_path_keeps_start_side() {
        let ctx = SimContext::new(10.0, 150, 3, 1.0);
        let start = Point::new(5.0, 5.0);
        let path = find_path(start, Point::new(1495.0, 5.0), &[], &ctx);

        assert_eq!(path.len(), MAX_PATH_STEPS);
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&Point::new(995.0, 5.0)));
    }

    #[test]
    fn test_long_path_first_step_respects_walls() {
        let ctx = SimContext::new(10.0, 150, 3, 1.0);
        // 最下段だけ通れる壁
        let walls = vec![wall(300.0, 0.0, 300.0, 20.0)];
        let path = find_path(Point::new(5.0, 5.0), Point::new(1495.0, 5.0), &walls, &ctx);

        assert_eq!(path.len(), MAX_PATH_STEPS);
        assert_eq!(path.first(), Some(&Point::new(5.0, 5.0)));
        assert_path_is_clear(&path, &walls);
    }

    #[test]
    fn test_find_path_enclosed_goal() {
        let ctx = context();
        let walls = vec![
            wall(48.0, 50.0, 62.0, 50.0),
            wall(48.0, 60.0, 62.0, 60.0),
            wall(50.0, 48.0, 50.0, 62.0),
            wall(60.0, 48.0, 60.0, 62.0),
        ];
        assert!(find_path(Point::new(5.0, 5.0), Point::new(55.0, 55.0), &walls, &ctx).is_empty());
    }

    #[test]
    fn test_random_free_point_avoids_deadzones() {
        let ctx = context();
        // 左半分を丸ごとデッドゾーンにする
        let walls = vec![wall(50.0, 0.0, 50.0, 100.0).with_deadzone(DeadSide::Left, 50.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..50 {
            let point = random_free_point(&ctx, &walls, &mut rng).expect("空き地点が見つからない");
            assert!(!walls[0].is_in_deadzone(&point));
            assert!(point.x >= 0.0 && point.x < ctx.width());
        }
    }
}
