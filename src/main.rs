use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command};
use intrusim::logging::{LogConfig, LogOutput, init_logging, level_for_verbosity, parse_log_level};
use intrusim::scenario::ScenarioConfig;
use intrusim::simulation::SimulationEngine;
use intrusim::statistics::TestStats;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("intrusim")
        .version("0.1.0")
        .about("侵入シミュレーション (Intrusion Simulation)")
        .long_about("ガードが巡回する施設への侵入をモンテカルロ法で評価します。\n\
                     p検定（ドア突破率）とq検定（経過時間比）のZ検定を行います。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .conflicts_with("stats")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
        )
        .arg(
            Arg::new("batches")
                .short('b')
                .long("batches")
                .value_name("N")
                .value_parser(clap::value_parser!(u32))
                .help("バッチ数を上書き")
        )
        .arg(
            Arg::new("iterations")
                .short('n')
                .long("iterations")
                .value_name("N")
                .value_parser(clap::value_parser!(u32))
                .help("バッチあたりの実行回数を上書き")
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .value_parser(clap::value_parser!(u64))
                .help("乱数シードを上書き")
        )
        .arg(
            Arg::new("observed-mean")
                .short('o')
                .long("observed-mean")
                .value_name("VALUE")
                .value_parser(clap::value_parser!(f64))
                .help("Z検定で比較する観測平均")
        )
        .arg(
            Arg::new("confidence")
                .long("confidence")
                .value_name("LEVEL")
                .value_parser(clap::value_parser!(f64))
                .help("信頼水準 (0.75, 0.90, 0.95, 0.99)")
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("FILE")
                .help("結果ファイルの出力先")
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .value_name("FILE")
                .help("保存済みの結果ファイルに対してZ検定のみ実行")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 試行ごと, -vv: 詳細, -vvv: トレース)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");

    let _log_guard = match setup_logging(&matches, verbose_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: ログ初期化に失敗しました: {}", e);
            std::process::exit(1);
        }
    };

    let result = if let Some(stats_path) = matches.get_one::<String>("stats") {
        analyze_stats(stats_path, &matches)
    } else if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        run_scenario(scenario_path, &matches, verbose_level)
    } else {
        show_default_help();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

fn setup_logging(
    matches: &ArgMatches,
    verbose_level: u8,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    let level = match matches.get_one::<String>("log-level") {
        Some(level) => parse_log_level(level),
        None => level_for_verbosity(verbose_level),
    };
    let output: LogOutput = matches
        .get_one::<String>("log-output")
        .map(|s| s.parse::<LogOutput>())
        .transpose()?
        .unwrap_or(LogOutput::Console);

    init_logging(&LogConfig {
        level,
        output,
        ..LogConfig::default()
    })
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, matches: &ArgMatches, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let mut scenario = ScenarioConfig::from_file(scenario_path)?;
    apply_overrides(&mut scenario, matches);
    scenario.validate()?;

    if matches.get_flag("info") {
        scenario.print_summary();
        return Ok(());
    }

    if verbose_level > 0 {
        scenario.print_summary();
        println!();
    }

    let mut engine = SimulationEngine::new(scenario, verbose_level)?;
    let report = engine.run()?;

    println!("検定: {} ({}回実行)", report.test_type, report.runs);
    println!("侵入者の勝利: {}回 / 敗北: {}回", report.wins, report.losses);
    println!("平均: {:.6}  分散: {:.6}", report.stats.mean, report.stats.variance);
    if let Some(path) = &report.output {
        println!("結果ファイル: {}", path.display());
    }
    println!("Z検定: {}", if report.passed { "合格" } else { "不合格" });

    Ok(())
}

/// コマンドライン指定でシナリオ設定を上書き
fn apply_overrides(scenario: &mut ScenarioConfig, matches: &ArgMatches) {
    if let Some(batches) = matches.get_one::<u32>("batches") {
        scenario.sim.batches = *batches;
    }
    if let Some(iterations) = matches.get_one::<u32>("iterations") {
        scenario.sim.iterations = *iterations;
    }
    if let Some(seed) = matches.get_one::<u64>("seed") {
        scenario.sim.seed = *seed;
    }
    if let Some(observed) = matches.get_one::<f64>("observed-mean") {
        scenario.sim.observed_mean = *observed;
    }
    if let Some(confidence) = matches.get_one::<f64>("confidence") {
        scenario.sim.confidence = *confidence;
    }
    if let Some(output) = matches.get_one::<String>("output") {
        scenario.sim.output = Some(PathBuf::from(output));
    }
}

/// 保存済みの結果ファイルに対してZ検定を実行
fn analyze_stats(stats_path: &str, matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let stats = TestStats::from_file(stats_path)?;
    let confidence = matches.get_one::<f64>("confidence").copied().unwrap_or(0.95);
    let observed = matches
        .get_one::<f64>("observed-mean")
        .copied()
        .ok_or("--stats には --observed-mean の指定が必要です")?;

    println!("標本数: {}", stats.samples.len());
    println!("平均: {:.6}  分散: {:.6}", stats.mean, stats.variance);

    match stats.z_test(confidence, observed) {
        Some(report) => println!("{}", report),
        None => println!("Z検定を実行できません (信頼水準 {:.2} または標本数を確認してください)", confidence),
    }

    Ok(())
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  intrusim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>  シナリオファイルを指定して実行");
    println!("  -i, --info             シナリオ情報のみ表示");
    println!("  --stats <FILE>         結果ファイルのZ検定のみ実行");
    println!("  -v, --verbose          詳細出力 (複数指定で詳細レベル上昇)");
    println!("  -h, --help             このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/basic.yaml          - 長期実行法のp検定");
    println!("  scenarios/ptest_batches.yaml  - バッチ法のp検定");
    println!();
    println!("例:");
    println!("  intrusim -s scenarios/basic.yaml");
    println!("  intrusim -s scenarios/ptest_batches.yaml -b 5 -n 20 -v");
    println!("  intrusim --stats results/basic.txt -o 0.5 --confidence 0.90");
}
