//! JSON output.

use std::io::Write;

use anyhow::Result;

use crate::models::EntityReference;

pub(crate) fn output(mut sink: impl Write, entities: &[EntityReference]) -> Result<()> {
    serde_json::to_writer_pretty(&mut sink, entities)?;
    writeln!(sink)?;
    Ok(())
}
