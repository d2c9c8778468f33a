// 基本的なデータ型と乱数
pub mod common;
pub mod error;
pub mod randomizer;

// 視線判定と経路探索
pub mod navigation;

// エージェントの基本インターフェース（trait）定義
pub mod traits;

// 各エージェントモデルの実装
pub mod movable;
pub mod door;
pub mod employee;
pub mod guard;
pub mod attacker;
pub mod level;

// 便利な re-export
pub use common::*;
pub use error::ModelError;
pub use randomizer::{Randomizer, SimRng};
pub use traits::{IMovable, Population, Release};
pub use movable::{Movable, MovementState};
pub use door::{Door, DoorState};
pub use employee::{Employee, EmployeeBehaviour};
pub use guard::{Guard, GuardBehaviour};
pub use attacker::{Attacker, AttackerBehaviour, AttackerStrategy};
pub use level::{Level, LevelEvent};
