//! bvh-bake - Bake scene meshes into a shadow-ray BVH buffer and inspect the result.

use anyhow::{bail, Context};
use shadow_bvh::prelude::*;
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use tracing_subscriber::EnvFilter;

/// Default filter directive per verbosity flag.
const LOG_QUIET: &str = "error";
const LOG_INFO: &str = "info";
const LOG_DEBUG: &str = "debug";
const LOG_TRACE: &str = "trace";

fn init_logging(level: &str) {
    // RUST_LOG wins over the command-line flags.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("bvh-bake");

    // Parse global flags
    let mut level = LOG_INFO;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => level = LOG_DEBUG,
            "-vv" | "--trace" => level = LOG_TRACE,
            "-q" | "--quiet" => level = LOG_QUIET,
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_usage(prog);
        return;
    }

    let result = match filtered_args[0] {
        "bake" | "b" => cmd_bake(&filtered_args[1..]),
        "inspect" | "i" => match filtered_args.get(1) {
            Some(path) => cmd_inspect(path),
            None => {
                eprintln!("Usage: {} inspect <file.bvh>", prog);
                std::process::exit(1);
            }
        },
        "--version" | "-V" | "version" => {
            print_version();
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_usage(prog);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(prog);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(prog: &str) {
    println!("bvh-bake - Bake shadow-ray BVH buffers");
    println!();
    println!("Usage: {} [options] <command> ...", prog);
    println!();
    println!("Commands:");
    println!("  b, bake <scene.json> <out.bvh>  Build and write a BVH buffer");
    println!("      --max-records N             Record budget (default 2 x triangles)");
    println!("      --settings <file.json>      Load bake settings from JSON");
    println!("  i, inspect <file.bvh>           Validate a buffer and print its layout");
    println!("  h, help                         Show this help");
    println!();
    println!("Options:");
    println!("  -v, --verbose  Debug output");
    println!("  -vv, --trace   Trace output (very verbose)");
    println!("  -q, --quiet    Errors only");
    println!("  -V, --version  Show version and build stamp");
}

fn print_version() {
    println!(
        "bvh-bake {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("BVH_BAKE_BUILD_DATE"),
        env!("BVH_BAKE_BUILD_TIME")
    );
}

fn cmd_bake(args: &[&str]) -> anyhow::Result<()> {
    let mut positional = Vec::new();
    let mut settings = BakeSettings::default();
    let mut max_records: Option<usize> = None;

    let mut it = args.iter();
    while let Some(&arg) = it.next() {
        match arg {
            "--max-records" => {
                let value = it.next().context("--max-records needs a value")?;
                max_records = Some(value.parse().with_context(|| format!("bad --max-records '{}'", value))?);
            }
            "--settings" => {
                let path = it.next().context("--settings needs a path")?;
                settings = BakeSettings::load(path).with_context(|| format!("loading settings {}", path))?;
            }
            _ => positional.push(arg),
        }
    }
    // Explicit flag overrides the settings file.
    if max_records.is_some() {
        settings.max_records = max_records;
    }

    let (scene_path, out_path) = match positional.as_slice() {
        [scene, out] => (*scene, *out),
        _ => bail!("usage: bake <scene.json> <out.bvh> [--max-records N] [--settings file.json]"),
    };

    tracing::info!("Loading scene: {}", scene_path);
    let scene = SceneDesc::load(scene_path).with_context(|| format!("loading scene {}", scene_path))?;
    let tris = scene.triangles();
    tracing::debug!("{} meshes, {} triangles", scene.meshes.len(), tris.len());

    let baked = bake(&tris, &settings)?;

    let file = File::create(out_path).with_context(|| format!("creating {}", out_path))?;
    baked.write_to(BufWriter::new(file))?;

    let desc = baked.desc();
    println!(
        "Wrote {}: {} elements, {} bytes ({} internal, {} leaf records)",
        out_path,
        desc.element_count,
        desc.size_bytes,
        baked.stats().internal_records,
        baked.stats().leaf_records
    );
    Ok(())
}

fn cmd_inspect(path: &str) -> anyhow::Result<()> {
    tracing::info!("Opening buffer: {}", path);
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    let baked = BakedBvh::read_from(BufReader::new(file)).with_context(|| format!("reading {}", path))?;

    let units = baked.units();
    let full = walk(units, |_| true, |_| {})?;
    let bounds = scene_bounds(units)?;
    let desc = baked.desc();

    let mut instances: Vec<u32> = Vec::new();
    let mut materials: Vec<u32> = Vec::new();
    let mut alpha_tested = 0usize;
    walk(units, |_| true, |t| {
        instances.push(t.instance_id);
        materials.push(t.material.id);
        alpha_tested += t.material.alpha_tested as usize;
    })?;
    instances.sort_unstable();
    instances.dedup();
    materials.sort_unstable();
    materials.dedup();

    println!("Buffer: {}", path);
    println!("Elements:  {} x {} bytes = {} bytes", desc.element_count, desc.struct_stride, desc.size_bytes);
    println!("Internal:  {}", full.nodes_entered);
    println!("Leaves:    {}", full.leaves_visited);
    println!("Instances: {}", instances.len());
    println!("Materials: {} ({} alpha-tested leaves)", materials.len(), alpha_tested);
    println!("Terminator at unit {}", full.end_offset);
    if bounds.is_empty() {
        println!("Bounds:    (empty)");
    } else {
        println!(
            "Bounds:    ({:.3}, {:.3}, {:.3}) - ({:.3}, {:.3}, {:.3})",
            bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
        );
    }
    Ok(())
}
