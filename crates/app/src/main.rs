mod plan;

use std::path::{Path, PathBuf};
use std::process;

use sculpt_core::{
    build_density_kernel, contour_density, CsgMode, NodeRegistry, Piece, Primitive, Project,
    SceneObject, SegmentChain, Transform, PROJECT_VERSION,
};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Debug, Default)]
struct CliArgs {
    log_level: Option<LevelFilter>,
    project_path: Option<PathBuf>,
    save_path: Option<PathBuf>,
    plan_path: Option<PathBuf>,
    print_kernel: bool,
    contour: bool,
    graph_demo: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--log-level" => parsed.log_level = Some(parse_level(&value("--log-level")?)?),
            "--project" => parsed.project_path = Some(PathBuf::from(value("--project")?)),
            "--save" => parsed.save_path = Some(PathBuf::from(value("--save")?)),
            "--plan" => parsed.plan_path = Some(PathBuf::from(value("--plan")?)),
            "--print-kernel" => parsed.print_kernel = true,
            "--contour" => parsed.contour = true,
            "--graph-demo" => parsed.graph_demo = true,
            "--help" => {
                print_help();
                process::exit(0);
            }
            other => return Err(format!("unknown argument {other}")),
        }
    }
    Ok(parsed)
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    match value.to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        other => Err(format!("unknown log level {other}")),
    }
}

fn print_help() {
    println!(
        "Options:\n  --log-level <off|error|warn|info|debug|trace>\n  --project <path>\n  \
         --save <path>\n  --print-kernel\n  --contour\n  --plan <path>\n  --graph-demo"
    );
}

fn load_project(path: &Path) -> Result<Project, String> {
    let data = std::fs::read(path).map_err(|err| err.to_string())?;
    let project: Project = serde_json::from_slice(&data).map_err(|err| err.to_string())?;
    if project.version > PROJECT_VERSION {
        tracing::warn!(
            "project version {} is newer than supported {}",
            project.version,
            PROJECT_VERSION
        );
    }
    Ok(project)
}

fn save_project(project: &Project, path: &Path) -> Result<(), String> {
    let data = serde_json::to_vec_pretty(project).map_err(|err| err.to_string())?;
    std::fs::write(path, data).map_err(|err| err.to_string())
}

/// Body with a carved socket and a tapered tail.
fn demo_project() -> Project {
    let scene = SceneObject::group("root")
        .with_child(SceneObject::with_piece(
            "body",
            Piece::leaf(CsgMode::Additive, Primitive::Sphere { radius: 1.0 }),
        ))
        .with_child(
            SceneObject::with_piece(
                "socket",
                Piece::leaf(
                    CsgMode::Subtractive,
                    Primitive::Box {
                        half_extents: [0.4, 0.4, 0.4],
                    },
                ),
            )
            .with_transform(Transform::from_translation([0.0, 0.9, 0.0])),
        )
        .with_child(SceneObject::with_piece(
            "tail",
            Piece::segment(
                CsgMode::Additive,
                SegmentChain {
                    points: vec![[0.8, 0.0, 0.0], [1.3, 0.2, 0.0], [1.7, 0.5, 0.0]],
                    radii: vec![0.25, 0.15, 0.05],
                },
            ),
        ));
    Project {
        scene,
        ..Project::default()
    }
}

fn run(args: &CliArgs) -> Result<(), String> {
    let project = match &args.project_path {
        Some(path) => {
            let project = load_project(path)?;
            tracing::info!("loaded project {:?}", path);
            project
        }
        None => demo_project(),
    };

    let kernel = build_density_kernel(&project.scene, &project.settings.kernel)
        .map_err(|err| err.to_string())?;
    println!(
        "kernel {}: {} pieces, {} shape bytes, {} transform bytes",
        kernel.function_name,
        kernel.piece_count(),
        kernel.shape_bytes().len(),
        kernel.transform_bytes().len()
    );
    if args.print_kernel {
        println!("{}", kernel.source);
    }

    if args.contour {
        let mesh = contour_density(&kernel, &project.settings.contour).map_err(|err| err.to_string())?;
        println!(
            "mesh: {} vertices, {} triangles, bounds {:?}",
            mesh.positions.len(),
            mesh.triangle_count(),
            mesh.bounds()
        );
    }

    if let Some(path) = &args.save_path {
        save_project(&project, path)?;
        tracing::info!("saved project to {:?}", path);
    }

    if args.plan_path.is_some() || args.graph_demo {
        let registry = NodeRegistry::with_builtins();
        let graph_plan = match &args.plan_path {
            Some(path) => plan::load_plan(path)?,
            None => plan::default_plan(),
        };
        plan::run_plan(&graph_plan, &registry, &project.settings.execution)?;
    }

    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err}");
            print_help();
            process::exit(2);
        }
    };

    let level = parsed.log_level.unwrap_or(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .with_filter(level),
        )
        .init();

    tracing::info!("sculpt starting");
    if let Err(err) = run(&parsed) {
        tracing::error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}
