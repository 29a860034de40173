use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_LOCALE: &str = "en-US";

fn main() {
    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("cargo sets OUT_DIR"));
    let locales_dir = manifest_dir.join("locales");
    println!("cargo:rerun-if-changed={}", locales_dir.display());

    let locales = load_locales(&locales_dir);
    fs::write(
        out_dir.join("formwork_i18n_generated.rs"),
        generate(&locales),
    )
    .expect("write generated i18n catalog");
}

fn load_locales(dir: &Path) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut locales = BTreeMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return locales;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        let Some(locale) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        println!("cargo:rerun-if-changed={}", path.display());

        let content = fs::read_to_string(&path)
            .unwrap_or_else(|error| panic!("read locale file {}: {error}", path.display()));
        let table = content
            .parse::<toml::Table>()
            .unwrap_or_else(|error| panic!("parse locale file {}: {error}", path.display()));
        let mut entries = BTreeMap::new();
        flatten("", &table, &mut entries);
        locales.insert(locale.to_string(), entries);
    }
    locales
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(text) => {
                out.insert(path, text.clone());
            }
            toml::Value::Table(child) => flatten(&path, child, out),
            other => {
                out.insert(path, other.to_string());
            }
        }
    }
}

fn generate(locales: &BTreeMap<String, BTreeMap<String, String>>) -> String {
    let mut code = String::new();
    let _ = writeln!(code, "pub const DEFAULT_LOCALE: &str = {DEFAULT_LOCALE:?};");
    let _ = writeln!(code, "pub static LOCALES: &[(&str, &[(&str, &str)])] = &[");
    for (locale, entries) in locales {
        let _ = writeln!(code, "    ({locale:?}, &[");
        for (key, value) in entries {
            let _ = writeln!(code, "        ({key:?}, {value:?}),");
        }
        let _ = writeln!(code, "    ]),");
    }
    let _ = writeln!(code, "];");
    code
}
