use crate::Count;
use crate::Probability;
use crate::error::Error;
use std::io::BufRead;
use std::io::Write;

/// per-species misclassification model: for every true family size,
/// a distribution of the observed size over a window of signed
/// offsets. observations that would land outside [0, max] pile up on
/// the boundary cell instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorModel {
    max: Count,
    fromdiff: i64,
    todiff: i64,
    rows: Vec<Vec<Probability>>,
}

impl ErrorModel {
    /// build from per-true-count offset distributions. a None row
    /// inherits the closest earlier row; the first row may not be
    /// missing. every row must sum to 1 within the column tolerance.
    pub fn new(
        max: Count,
        fromdiff: i64,
        todiff: i64,
        rows: Vec<Option<Vec<Probability>>>,
    ) -> Result<Self, Error> {
        if fromdiff > 0 || todiff < 0 || fromdiff > todiff {
            return Err(Error::inconsistent(format!(
                "offset window [{}, {}] does not cover zero",
                fromdiff, todiff
            )));
        }
        let width = (todiff - fromdiff + 1) as usize;
        let mut filled: Vec<Vec<Probability>> = Vec::with_capacity(max + 1);
        for (truth, row) in rows.into_iter().enumerate() {
            match row {
                Some(row) if row.len() == width => filled.push(row),
                Some(row) => {
                    return Err(Error::inconsistent(format!(
                        "row {} has {} entries, expected {}",
                        truth,
                        row.len(),
                        width
                    )));
                }
                None => match filled.last() {
                    Some(last) => filled.push(last.clone()),
                    None => {
                        return Err(Error::inconsistent(
                            "the distribution for true count 0 is missing".to_string(),
                        ));
                    }
                },
            }
        }
        if filled.len() != max + 1 {
            return Err(Error::inconsistent(format!(
                "{} rows for max count {}",
                filled.len(),
                max
            )));
        }
        let model = Self {
            max,
            fromdiff,
            todiff,
            rows: filled,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn max(&self) -> Count {
        self.max
    }

    /// P(observe | true). the column for one true count is its offset
    /// row, with out-of-support offsets folded into the boundaries, so
    /// columns inherit the row normalization.
    pub fn probability(&self, observed: Count, truth: Count) -> Probability {
        let truth = truth as i64;
        let mut p = 0.0;
        for (slot, weight) in self.rows[truth as usize].iter().enumerate() {
            let diff = self.fromdiff + slot as i64;
            let landing = (truth + diff).clamp(0, self.max as i64) as Count;
            if landing == observed {
                p += weight;
            }
        }
        p
    }

    fn validate(&self) -> Result<(), Error> {
        for (truth, row) in self.rows.iter().enumerate() {
            if row.iter().any(|p| *p < 0.0) {
                return Err(Error::inconsistent(format!(
                    "negative probability for true count {}",
                    truth
                )));
            }
            let sum: Probability = row.iter().sum();
            if (sum - 1.0).abs() > crate::COLUMN_SUM_TOLERANCE {
                return Err(Error::inconsistent(format!(
                    "distribution for true count {} sums to {}",
                    truth, sum
                )));
            }
        }
        Ok(())
    }

    /// file format:
    ///   maxcnt: N
    ///   cntdiff d_from .. d_to
    ///   true_count p_from .. p_to
    /// rows may be sparse; a gap repeats the previous row.
    pub fn read<R: BufRead>(reader: R, file: &str) -> Result<Self, Error> {
        let mut lines = Vec::new();
        for (at, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim().to_string();
            if !line.is_empty() {
                lines.push((at + 1, line));
            }
        }
        let mut lines = lines.into_iter();
        let (at, header) = lines
            .next()
            .ok_or_else(|| Error::parse(file, 1, "empty error model"))?;
        let max: Count = header
            .strip_prefix("maxcnt:")
            .map(str::trim)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::parse(file, at, "expected 'maxcnt: N'"))?;
        let (at, diffs) = lines
            .next()
            .ok_or_else(|| Error::parse(file, at, "missing cntdiff row"))?;
        let diffs: Vec<i64> = diffs
            .strip_prefix("cntdiff")
            .ok_or_else(|| Error::parse(file, at, "expected 'cntdiff ...'"))?
            .split_whitespace()
            .map(|d| {
                d.parse()
                    .map_err(|_| Error::parse(file, at, format!("bad offset '{}'", d)))
            })
            .collect::<Result<_, _>>()?;
        let (fromdiff, todiff) = match (diffs.first(), diffs.last()) {
            (Some(from), Some(to)) => (*from, *to),
            _ => return Err(Error::parse(file, at, "empty cntdiff row")),
        };
        if diffs.len() != (todiff - fromdiff + 1) as usize
            || !diffs.windows(2).all(|w| w[1] == w[0] + 1)
        {
            return Err(Error::parse(file, at, "offsets must be consecutive"));
        }
        let mut rows: Vec<Option<Vec<Probability>>> = vec![None; max + 1];
        for (at, line) in lines {
            let mut fields = line.split_whitespace();
            let truth: Count = fields
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| Error::parse(file, at, "expected a true count"))?;
            if truth > max {
                return Err(Error::parse(
                    file,
                    at,
                    format!("true count {} above maxcnt {}", truth, max),
                ));
            }
            let row: Vec<Probability> = fields
                .map(|p| {
                    p.parse()
                        .map_err(|_| Error::parse(file, at, format!("bad probability '{}'", p)))
                })
                .collect::<Result<_, _>>()?;
            rows[truth] = Some(row);
        }
        Self::new(max, fromdiff, todiff, rows)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Self::read(
            std::io::BufReader::new(file),
            &path.display().to_string(),
        )
    }

    /// canonical output: every row present, offsets dense
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        writeln!(writer, "maxcnt: {}", self.max)?;
        let offsets: Vec<String> = (self.fromdiff..=self.todiff)
            .map(|d| d.to_string())
            .collect();
        writeln!(writer, "cntdiff {}", offsets.join(" "))?;
        for (truth, row) in self.rows.iter().enumerate() {
            let row: Vec<String> = row.iter().map(|p| p.to_string()).collect();
            writeln!(writer, "{} {}", truth, row.join(" "))?;
        }
        Ok(())
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), Error> {
        let file = std::fs::File::create(path)?;
        self.write(std::io::BufWriter::new(file))
    }
}
