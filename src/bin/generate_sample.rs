use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_pickle::{HashableValue, SerOptions, Value as PickleValue};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len() as u64) as usize]
    }
}

/// One row of RAW_recipes.
struct Recipe {
    id: i64,
    name: String,
    minutes: i64,
    n_steps: i64,
    tags: Option<String>,
    /// `[calories, total fat, sugar, sodium, protein, saturated fat, carbs]`
    nutrition: String,
}

const ZIP_NAME: &str = "RAW_recipes.csv.zip";
/// Own stem, so it does not extract into the zip's directory.
const XZ_NAME: &str = "RAW_recipes_xz.csv.xz";

const COLUMNS: [&str; 6] = ["id", "name", "minutes", "n_steps", "tags", "nutrition"];

fn generate_recipes(n: usize, rng: &mut SimpleRng) -> Vec<Recipe> {
    let dishes = ["soup", "pizza", "salad", "pie", "stew", "curry", "cake"];
    let adjectives = ["spicy", "easy", "grandma's", "quick", "vegan", "rustic"];
    let tags = ["bio", "non-bio", "vegetarian", "30-minutes-or-less"];

    (0..n)
        .map(|i| {
            let nutrition: Vec<String> = (0..7)
                .map(|_| format!("{:.1}", rng.below(8000) as f64 / 10.0))
                .collect();
            Recipe {
                id: 100_000 + i as i64,
                name: format!("{} {}", rng.pick(&adjectives), rng.pick(&dishes)),
                minutes: 5 + rng.below(180) as i64,
                n_steps: 1 + rng.below(15) as i64,
                // Every seventh recipe is untagged.
                tags: (i % 7 != 3).then(|| rng.pick(&tags).to_string()),
                nutrition: format!("[{}]", nutrition.join(", ")),
            }
        })
        .collect()
}

fn write_csv(path: &Path, recipes: &[Recipe]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(COLUMNS)?;
    for r in recipes {
        writer.write_record([
            r.id.to_string(),
            r.name.clone(),
            r.minutes.to_string(),
            r.n_steps.to_string(),
            r.tags.clone().unwrap_or_default(),
            r.nutrition.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_zip(path: &Path, csv_path: &Path) -> Result<()> {
    let mut zip = zip::ZipWriter::new(File::create(path)?);
    let name = csv_path
        .file_name()
        .context("CSV path has no file name")?
        .to_string_lossy()
        .into_owned();
    zip.start_file(name, zip::write::SimpleFileOptions::default())?;
    zip.write_all(&std::fs::read(csv_path)?)?;
    zip.finish()?;
    Ok(())
}

fn write_xz(path: &Path, csv_path: &Path) -> Result<()> {
    let mut encoder = xz2::write::XzEncoder::new(File::create(path)?, 6);
    encoder.write_all(&std::fs::read(csv_path)?)?;
    encoder.finish()?;
    Ok(())
}

fn write_parquet(path: &Path, recipes: &[Recipe]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("minutes", DataType::Int64, false),
        Field::new("n_steps", DataType::Int64, false),
        Field::new("tags", DataType::Utf8, true),
        Field::new("nutrition", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(recipes.iter().map(|r| r.id))),
            Arc::new(StringArray::from_iter_values(recipes.iter().map(|r| &r.name))),
            Arc::new(Int64Array::from_iter_values(recipes.iter().map(|r| r.minutes))),
            Arc::new(Int64Array::from_iter_values(recipes.iter().map(|r| r.n_steps))),
            Arc::new(StringArray::from(
                recipes.iter().map(|r| r.tags.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from_iter_values(
                recipes.iter().map(|r| &r.nutrition),
            )),
        ],
    )?;

    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_json(path: &Path, recipes: &[Recipe]) -> Result<()> {
    let records: Vec<serde_json::Value> = recipes
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "name": r.name,
                "minutes": r.minutes,
                "n_steps": r.n_steps,
                "tags": r.tags,
                "nutrition": r.nutrition,
            })
        })
        .collect();
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut out, &records)?;
    out.flush()?;
    Ok(())
}

/// Pickle in pandas' "split" orientation so column order survives.
fn write_pickle(path: &Path, recipes: &[Recipe]) -> Result<()> {
    let columns = COLUMNS
        .iter()
        .map(|c| PickleValue::String(c.to_string()))
        .collect();
    let data = recipes
        .iter()
        .map(|r| {
            PickleValue::List(vec![
                PickleValue::I64(r.id),
                PickleValue::String(r.name.clone()),
                PickleValue::I64(r.minutes),
                PickleValue::I64(r.n_steps),
                r.tags
                    .clone()
                    .map_or(PickleValue::None, PickleValue::String),
                PickleValue::String(r.nutrition.clone()),
            ])
        })
        .collect();

    let mut dict = BTreeMap::new();
    dict.insert(
        HashableValue::String("columns".to_string()),
        PickleValue::List(columns),
    );
    dict.insert(HashableValue::String("data".to_string()), PickleValue::List(data));

    let mut out = BufWriter::new(File::create(path)?);
    serde_pickle::value_to_writer(&mut out, &PickleValue::Dict(dict), SerOptions::new())?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dataset"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let recipes = generate_recipes(200, &mut rng);

    let csv_path = out_dir.join("RAW_recipes.csv");
    write_csv(&csv_path, &recipes).context("writing CSV")?;
    write_zip(&out_dir.join(ZIP_NAME), &csv_path).context("writing zip")?;
    write_xz(&out_dir.join(XZ_NAME), &csv_path).context("writing xz")?;
    write_parquet(&out_dir.join("RAW_recipes.parquet"), &recipes).context("writing parquet")?;
    write_json(&out_dir.join("RAW_recipes.json"), &recipes).context("writing JSON")?;
    write_pickle(&out_dir.join("RAW_recipes.pkl"), &recipes).context("writing pickle")?;

    println!(
        "Wrote {} recipes in 6 formats to {}",
        recipes.len(),
        out_dir.display()
    );
    Ok(())
}
