//! # intrusim
//!
//! ガードが巡回する施設への侵入をモンテカルロ法で評価するシミュレータ。
//!
//! - `models`: グリッド・視線・経路探索と、ドア・従業員・ガード・侵入者の状態機械
//! - `simulation`: バッチ × 実行回数のループ
//! - `statistics`: p値・q値の推定とZ検定

pub mod logging;
pub mod models;
pub mod scenario;
pub mod simulation;
pub mod statistics;
