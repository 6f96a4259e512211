use std::collections::BTreeMap;
use std::io::BufRead;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use crate::io::{Frame, error::Error};
use crate::model::site::Site;
use crate::model::structure::{Lattice, Material, Molecule, Structure};
use crate::model::types::Element;

/// Comment-line keys that describe the frame rather than label it.
const RESERVED_KEYS: [&str; 3] = ["lattice", "properties", "pbc"];

pub fn read<R: BufRead>(reader: R) -> Result<Vec<Frame>, Error> {
    let mut lines = reader
        .lines()
        .enumerate()
        .map(|(i, line)| line.map(|content| (i + 1, content)));
    let mut frames = Vec::new();

    loop {
        let (count_ln, count_line) = loop {
            match lines.next().transpose()? {
                Some((_, line)) if line.trim().is_empty() => continue,
                Some(entry) => break entry,
                None => return Ok(frames),
            }
        };
        let count = count_line
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::parse(count_ln, "invalid atom count line"))?;

        let (comment_ln, comment) = lines
            .next()
            .transpose()?
            .ok_or_else(|| Error::parse(count_ln, "frame ended before its comment line"))?;
        let header = parse_comment(&comment, comment_ln)?;

        let mut sites = Vec::with_capacity(count);
        for _ in 0..count {
            let (ln, raw) = lines.next().transpose()?.ok_or_else(|| {
                Error::parse(
                    comment_ln,
                    format!("frame declares {count} atoms but the input ended early"),
                )
            })?;
            sites.push(parse_site(&raw, ln)?);
        }

        let material: Material = match header.lattice {
            Some(lattice) if header.periodic => Structure::with_sites(lattice, sites).into(),
            _ => Molecule::with_sites(sites).into(),
        };
        frames.push(Frame {
            material,
            properties: header.properties,
        });
    }
}

struct Header {
    lattice: Option<Lattice>,
    periodic: bool,
    properties: BTreeMap<String, f64>,
}

fn parse_comment(comment: &str, line: usize) -> Result<Header, Error> {
    let mut header = Header {
        lattice: None,
        periodic: true,
        properties: BTreeMap::new(),
    };

    for (key, value) in key_values(comment, line)? {
        if key.eq_ignore_ascii_case("lattice") {
            header.lattice = Some(parse_lattice(&value, line)?);
        } else if key.eq_ignore_ascii_case("pbc") {
            header.periodic = value
                .split_whitespace()
                .any(|flag| matches!(flag, "T" | "t" | "True" | "true" | "1"));
        } else if RESERVED_KEYS.iter().any(|r| key.eq_ignore_ascii_case(r)) {
            continue;
        } else if let Ok(number) = value.parse::<f64>() {
            header.properties.insert(key, number);
        }
    }
    Ok(header)
}

fn key_values(comment: &str, line: usize) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    let mut chars = comment.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return Ok(pairs);
        }

        let key = take_token(&mut chars, |c| !c.is_whitespace() && c != '=');
        if chars.next_if_eq(&'=').is_none() {
            // Bare flag without a value.
            continue;
        }
        if key.is_empty() {
            return Err(Error::parse(line, "comment line has a value without a key"));
        }

        let value = if chars.next_if_eq(&'"').is_some() {
            let mut value = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                return Err(Error::parse(
                    line,
                    format!("unterminated quoted value for '{key}'"),
                ));
            }
            value
        } else {
            take_token(&mut chars, |c| !c.is_whitespace())
        };
        pairs.push((key, value));
    }
}

fn take_token(chars: &mut Peekable<Chars<'_>>, accept: impl Fn(char) -> bool) -> String {
    let mut token = String::new();
    while let Some(c) = chars.next_if(|&c| accept(c)) {
        token.push(c);
    }
    token
}

fn parse_lattice(value: &str, line: usize) -> Result<Lattice, Error> {
    let numbers = value
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Error::parse(line, "lattice contains a non-numeric entry"))?;
    if numbers.len() != 9 {
        return Err(Error::parse(
            line,
            format!("lattice needs 9 numbers, found {}", numbers.len()),
        ));
    }
    Ok([
        [numbers[0], numbers[1], numbers[2]],
        [numbers[3], numbers[4], numbers[5]],
        [numbers[6], numbers[7], numbers[8]],
    ])
}

fn parse_site(raw: &str, line: usize) -> Result<Site, Error> {
    let tokens: Vec<_> = raw.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err(Error::parse(
            line,
            "atom line must contain a symbol and three coordinates",
        ));
    }

    let element = Element::from_str(&normalize_symbol(tokens[0]))
        .map_err(|_| Error::parse(line, format!("unknown element symbol '{}'", tokens[0])))?;
    let mut position = [0.0; 3];
    for (axis, token) in tokens[1..4].iter().enumerate() {
        position[axis] = token
            .parse::<f64>()
            .map_err(|_| Error::parse(line, format!("invalid coordinate '{token}'")))?;
    }
    Ok(Site::new(element, position))
}

/// `"FE"` and `"fe"` both become `"Fe"`.
fn normalize_symbol(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_FRAMES: &str = "\
3
Properties=species:S:1:pos:R:3 energy=-14.22 name=water gap=6.5
O 0.0 0.0 0.0
H 0.96 0.0 0.0
H -0.24 0.93 0.0

2
Lattice=\"5.64 0 0 0 5.64 0 0 0 5.64\" energy=-7.5 pbc=\"T T T\"
Na 0.0 0.0 0.0
CL 2.82 2.82 2.82
";

    #[test]
    fn reads_molecules_and_crystals() {
        let frames = read(Cursor::new(TWO_FRAMES)).unwrap();
        assert_eq!(frames.len(), 2);

        let water = &frames[0];
        assert!(!water.material.is_periodic());
        assert_eq!(water.material.formula(), "H2O");
        assert_eq!(water.properties.get("energy"), Some(&-14.22));
        assert_eq!(water.properties.get("gap"), Some(&6.5));
        assert!(!water.properties.contains_key("name"));

        let salt = &frames[1];
        assert!(salt.material.is_periodic());
        assert_eq!(salt.material.lattice().unwrap()[1], [0.0, 5.64, 0.0]);
        assert_eq!(salt.material.sites()[1].element, Element::Cl);
        assert_eq!(salt.properties.len(), 1);
    }

    #[test]
    fn non_periodic_flags_make_a_molecule() {
        let text = "1\nLattice=\"10 0 0 0 10 0 0 0 10\" pbc=\"F F F\"\nHe 0 0 0\n";
        let frames = read(Cursor::new(text)).unwrap();
        assert!(!frames[0].material.is_periodic());
    }

    #[test]
    fn errors_point_at_the_offending_line() {
        let truncated = "3\ncomment\nO 0 0 0\n";
        assert!(matches!(
            read(Cursor::new(truncated)),
            Err(Error::Parse { line: 2, .. })
        ));

        let bad_element = "1\n\nXq 0 0 0\n";
        assert!(matches!(
            read(Cursor::new(bad_element)),
            Err(Error::Parse { line: 3, .. })
        ));

        let bad_lattice = "1\nLattice=\"1 0 0 0 1 0\"\nH 0 0 0\n";
        assert!(matches!(
            read(Cursor::new(bad_lattice)),
            Err(Error::Parse { line: 2, .. })
        ));

        let unterminated = "1\nLattice=\"1 0 0\nH 0 0 0\n";
        assert!(matches!(
            read(Cursor::new(unterminated)),
            Err(Error::Parse { line: 2, .. })
        ));

        assert!(matches!(
            read(Cursor::new("three\n")),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn empty_input_has_no_frames() {
        assert!(read(Cursor::new("\n\n")).unwrap().is_empty());
    }
}
