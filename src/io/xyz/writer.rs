use std::io::Write;

use crate::io::{Frame, error::Error};

pub fn write<W: Write>(mut writer: W, frames: &[Frame]) -> Result<(), Error> {
    for frame in frames {
        let sites = frame.material.sites();
        writeln!(writer, "{}", sites.len())?;

        let mut comment = Vec::new();
        if let Some(lattice) = frame.material.lattice() {
            let flat: Vec<String> = lattice.iter().flatten().map(f64::to_string).collect();
            comment.push(format!("Lattice=\"{}\"", flat.join(" ")));
        }
        comment.push("Properties=species:S:1:pos:R:3".to_string());
        for (key, value) in &frame.properties {
            comment.push(format!("{key}={value}"));
        }
        if frame.material.is_periodic() {
            comment.push("pbc=\"T T T\"".to_string());
        }
        writeln!(writer, "{}", comment.join(" "))?;

        for site in sites {
            writeln!(
                writer,
                "{:<2} {:>15.8} {:>15.8} {:>15.8}",
                site.element.symbol(),
                site.position[0],
                site.position[1],
                site.position[2]
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}
