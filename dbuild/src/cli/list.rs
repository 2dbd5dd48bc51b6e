use comfy_table::{Attribute, Cell, ContentArrangement, Table};

use crate::{engine::ContainerEngine, engine::ContainerSummary, time_ext, Result};

pub fn list<E: ContainerEngine + ?Sized>(engine: &E) -> Result<()> {
    let mut containers = engine.list_containers()?;
    containers.sort_by(|a, b| a.created.cmp(&b.created).reverse());

    if containers.is_empty() {
        println!("No dbuild containers found.");
    } else {
        println!("{}", table(&containers)?);
    }

    Ok(())
}

fn table(containers: &[ContainerSummary]) -> Result<Table> {
    // Every closure has its own type. Coercing them to a function pointer gives the array of columns a single element
    // type.
    type Accessor = fn(&ContainerSummary) -> Result<Option<String>>;

    fn accessor(f: Accessor) -> Accessor {
        f
    }

    let columns = [
        (
            "container".to_string(),
            accessor(|row| Ok(Some(row.id.chars().take(12).collect()))),
        ),
        ("phase".to_string(), accessor(|row| Ok(row.phase.clone()))),
        (
            "build directory".to_string(),
            accessor(|row| Ok(row.build_dir.clone())),
        ),
        (
            "state".to_string(),
            accessor(|row| {
                Ok(Some(if row.is_running() {
                    row.state.clone()
                } else {
                    format!("{} ({})", row.state, row.exit_code)
                }))
            }),
        ),
        (
            format!(
                "created ({})",
                time_ext::format_offset(time_ext::local_offset())?
            ),
            accessor(|row| Ok(Some(time_ext::format_local(row.created)?))),
        ),
    ];

    let (column_names, accessors): (Vec<_>, Vec<_>) = columns.into_iter().unzip();

    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            column_names
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );

    for row in containers {
        // Collect first so that errors surface before the row is added, `Table::add_row` does not accept a Result.
        table.add_row({
            accessors
                .iter()
                .map(|f| f(row))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|value| value.unwrap_or_default())
        });
    }

    Ok(table)
}
