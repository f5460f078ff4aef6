//! Stateless parsers for the text output of the sensor tools.
//!
//! All parsers tolerate noise: a record with the wrong number of fields after
//! splitting is skipped, never an error. Numeric conversion of a value that
//! was selected is strict and fails the fetch.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SamplerError};

/// One delimiter-split record: trimmed key to trimmed value.
pub type KeyValueBlock = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Key/value records
// ---------------------------------------------------------------------------

/// Parse `key<delim>value` lines. Lines that do not split into exactly two
/// fields are skipped; later duplicates win.
pub fn key_value_lines(text: &str, delim: char) -> KeyValueBlock {
    let mut block = KeyValueBlock::new();
    for line in text.lines() {
        let mut fields = line.split(delim);
        let (Some(key), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };
        block.insert(key.trim().to_string(), value.trim().to_string());
    }
    block
}

/// Split text into blank-line-separated blocks of `key : value` lines.
/// Blocks with no well-formed line are dropped.
pub fn colon_blocks(text: &str) -> Vec<KeyValueBlock> {
    text.split("\n\n")
        .map(|chunk| key_value_lines(chunk, ':'))
        .filter(|block| !block.is_empty())
        .collect()
}

/// Numeric part of a reading such as `"35.00 Watts"`: the text before the
/// first space, parsed as `f64`.
pub fn leading_number(field: &str, value: &str) -> Result<f64> {
    let token = value.split(' ').next().unwrap_or_default();
    token
        .parse::<f64>()
        .map_err(|e| SamplerError::parse(field, value, e))
}

// ---------------------------------------------------------------------------
// Tool-specific row formats
// ---------------------------------------------------------------------------

/// Rows of `virsh list`: two header lines, then `id name state`.
///
/// Rows without exactly three whitespace-separated tokens, or with a
/// non-numeric id, are skipped.
pub fn running_domains(text: &str) -> BTreeMap<u32, String> {
    text.lines()
        .skip(2)
        .filter_map(|row| {
            let tokens: Vec<&str> = row.split_whitespace().collect();
            if tokens.len() != 3 {
                return None;
            }
            let id = tokens[0].parse::<u32>().ok()?;
            Some((id, tokens[1].to_string()))
        })
        .collect()
}

/// Per-core rows of `cpufreq-aperf -o`: `<index>\t<frequency>` with an
/// optional `\t\t`-separated tail.
///
/// Returns core index to frequency in GHz. The index is stripped of `'0'`
/// characters (an all-zero index becomes `"0"`), so repeated indices collapse
/// and the last row wins.
pub fn core_frequencies(text: &str) -> Result<BTreeMap<String, f64>> {
    let mut cores = BTreeMap::new();
    for row in text.lines() {
        let head = row.split("\t\t").next().unwrap_or_default();
        let fields: Vec<&str> = head.split('\t').collect();
        if fields.len() != 2 {
            continue;
        }
        let index = match fields[0].trim_matches('0') {
            "" => "0",
            idx => idx,
        };
        let raw = fields[1].trim();
        let counter = raw
            .parse::<f64>()
            .map_err(|e| SamplerError::parse("cpu frequency", raw, e))?;
        cores.insert(format!("cpu{index}"), counter / 1_000_000.0);
    }
    Ok(cores)
}

/// Temperature readings of `ipmitool sdr` rows whose name contains `CPU`.
///
/// Rows are pipe-separated; the reading is the first token of the fifth
/// field. CPU rows with fewer than five fields are skipped.
pub fn cpu_temperatures(text: &str) -> Result<Vec<f64>> {
    let mut readings = Vec::new();
    for row in text.lines() {
        let fields: Vec<&str> = row.split('|').collect();
        if !fields[0].contains("CPU") || fields.len() < 5 {
            continue;
        }
        let raw = fields[4].trim();
        let token = raw.split_whitespace().next().unwrap_or_default();
        let value = token
            .parse::<f64>()
            .map_err(|e| SamplerError::parse("cpu temperature", raw, e))?;
        readings.push(value);
    }
    Ok(readings)
}

/// Arithmetic mean that refuses to divide by zero.
pub fn mean(values: &[f64], quantity: &str) -> Result<f64> {
    if values.is_empty() {
        return Err(SamplerError::empty(quantity));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // key_value_lines
    // -----------------------------------------------------------------------

    #[test]
    fn colon_pairs_trimmed() {
        let block = key_value_lines("CPU model:           x86_64\nCPU(s):              48\n", ':');
        assert_eq!(block["CPU model"], "x86_64");
        assert_eq!(block["CPU(s)"], "48");
    }

    #[test]
    fn malformed_lines_skipped() {
        let text = "Current Power : 95.00 Watts\n\
                    Timestamp : Mon Oct 18 12:00:00 2026\n\
                    no delimiter here\n\
                    \n";
        let block = key_value_lines(text, ':');
        assert_eq!(block.len(), 1);
        assert_eq!(block["Current Power"], "95.00 Watts");
    }

    #[test]
    fn equals_pairs() {
        let block = key_value_lines("Domain: 'instance-1'\n  vcpu.current=2\n  vcpu.0.time=10\n", '=');
        assert_eq!(block.len(), 2);
        assert_eq!(block["vcpu.current"], "2");
    }

    // -----------------------------------------------------------------------
    // colon_blocks
    // -----------------------------------------------------------------------

    #[test]
    fn blocks_split_on_blank_lines() {
        let text = "==============NVSMI LOG==============\n\n\
                    Attached GPUs : 2\n\n\
                    Power Draw : 60.00 W\nPower Limit : 250.00 W\n\n\
                    Power Draw : 40.00 W\n";
        let blocks = colon_blocks(text);
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks
                .iter()
                .filter(|b| b.contains_key("Power Draw"))
                .count(),
            2
        );
    }

    // -----------------------------------------------------------------------
    // leading_number
    // -----------------------------------------------------------------------

    #[test]
    fn leading_number_strips_unit() {
        assert_eq!(leading_number("Current Power", "95.00 Watts").unwrap(), 95.0);
        assert_eq!(leading_number("Power Draw", "60.5").unwrap(), 60.5);
    }

    #[test]
    fn leading_number_rejects_text() {
        let err = leading_number("Power Draw", "N/A").unwrap_err();
        assert!(matches!(err, SamplerError::Parse { .. }));
    }

    // -----------------------------------------------------------------------
    // running_domains
    // -----------------------------------------------------------------------

    #[test]
    fn running_domains_skips_headers() {
        let text = " Id    Name                           State\n\
                    ----------------------------------------------------\n \
                    2     instance-00000001              running\n \
                    7     instance-00000004              running\n\
                    \n";
        let domains = running_domains(text);
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[&2], "instance-00000001");
        assert_eq!(domains[&7], "instance-00000004");
    }

    #[test]
    fn running_domains_skips_odd_rows() {
        let text = "header\n----\n 3 vm-a running\n 4 vm b running\n x vm-c running\n";
        let domains = running_domains(text);
        assert_eq!(domains.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    // -----------------------------------------------------------------------
    // core_frequencies
    // -----------------------------------------------------------------------

    #[test]
    fn frequencies_scaled_to_ghz() {
        let text = "CPU\tAverage freq(KHz)\tTime in C0\tTime in Cx\tC0 percentage\n\
                    000\t2400000\t\t00 sec 012 ms\n\
                    001\t2600000\t\t00 sec 010 ms\n";
        let cores = core_frequencies(text).unwrap();
        assert_eq!(cores.len(), 2);
        assert!((cores["cpu0"] - 2.4).abs() < 1e-9);
        assert!((cores["cpu1"] - 2.6).abs() < 1e-9);
    }

    #[test]
    fn frequency_index_zero_stripping_collapses() {
        // "010" and "01" both strip to "1"; the later row wins.
        let text = "010\t1000000\n01\t3000000\n";
        let cores = core_frequencies(text).unwrap();
        assert_eq!(cores.len(), 1);
        assert!((cores["cpu1"] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn frequency_bad_value_is_error() {
        assert!(core_frequencies("000\tfast\n").is_err());
    }

    // -----------------------------------------------------------------------
    // cpu_temperatures
    // -----------------------------------------------------------------------

    #[test]
    fn temperatures_only_cpu_rows() {
        let text = "CPU1 Temp        | 30h | ok  |  3.1 | 45 degrees C\n\
                    System Temp      | 32h | ok  |  7.1 | 30 degrees C\n";
        assert_eq!(cpu_temperatures(text).unwrap(), vec![45.0]);
    }

    #[test]
    fn short_cpu_row_skipped() {
        let text = "CPU2 Temp | 31h | ns\nCPU1 Temp | 30h | ok | 3.1 | 50 degrees C\n";
        assert_eq!(cpu_temperatures(text).unwrap(), vec![50.0]);
    }

    // -----------------------------------------------------------------------
    // mean
    // -----------------------------------------------------------------------

    #[test]
    fn mean_of_empty_is_error() {
        let err = mean(&[], "gpu.power").unwrap_err();
        assert!(err.is_empty_data());
    }

    #[test]
    fn mean_basic() {
        assert_eq!(mean(&[60.0, 40.0], "gpu.power").unwrap(), 50.0);
    }
}
