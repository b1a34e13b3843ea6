//! 运行结果.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use gate_berry::VolumeShape;

const S4: &str = "    ";

/// 一次分解或重建的结果.
#[derive(Debug)]
pub struct RunReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub shape: VolumeShape,
    pub t_dim: usize,
    pub slices: usize,
    pub missing: usize,
    pub nifti_files: usize,
    pub elapsed: Duration,
}

impl RunReport {
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let VolumeShape { z, x, y } = self.shape;
        writeln!(w, "Run summary:")?;
        writeln!(w, "{S4}Input: {}", self.input.display())?;
        writeln!(w, "{S4}Output: {}", self.output.display())?;
        writeln!(w, "{S4}Volume: {z} x {x} x {y}, {} time points", self.t_dim)?;
        writeln!(w, "{S4}Slices decomposed: {}", self.slices)?;
        writeln!(w, "{S4}Missing slices: {}", self.missing)?;
        writeln!(w, "{S4}NIFTI files written: {}", self.nifti_files)?;
        write!(w, "{S4}Total time: {} ms", self.elapsed.as_millis())?;
        Ok(())
    }

    /// 打印运行结果.
    pub fn analyze(&self) {
        print_block(|buf| self.describe_into(buf));
    }
}

/// 时间主成分分析的结果.
#[derive(Debug)]
pub struct ComponentsReport {
    pub output: PathBuf,
    pub singular_values: Vec<f64>,
    pub files: usize,
}

impl ComponentsReport {
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let total: f64 = self.singular_values.iter().map(|s| s * s).sum();
        writeln!(w, "Temporal components:")?;
        writeln!(w, "{S4}Output: {}", self.output.display())?;
        for (i, s) in self.singular_values.iter().enumerate() {
            let share = if total > 0.0 { s * s / total } else { 0.0 };
            writeln!(w, "{S4}C{i}: sigma = {s:.6}, energy = {:.2}%", share * 100.0)?;
        }
        write!(w, "{S4}Files written: {}", self.files)?;
        Ok(())
    }

    /// 打印运行结果.
    pub fn analyze(&self) {
        print_block(|buf| self.describe_into(buf));
    }
}

fn print_block<F: FnOnce(&mut Vec<u8>) -> io::Result<()>>(describe: F) {
    let mut buf = Vec::with_capacity(512);
    utils::sep();
    // 写入内存缓冲区不会失败.
    let _ = describe(&mut buf);
    println!("{}", String::from_utf8_lossy(&buf));
    utils::sep();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_report() {
        let report = RunReport {
            input: "in".into(),
            output: "out".into(),
            shape: VolumeShape::new(2, 3, 4),
            t_dim: 5,
            slices: 6,
            missing: 0,
            nifti_files: 10,
            elapsed: Duration::from_millis(1500),
        };
        let mut buf = Vec::new();
        report.describe_into(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Volume: 2 x 3 x 4, 5 time points"));
        assert!(text.ends_with("Total time: 1500 ms"));
    }

    #[test]
    fn test_components_report() {
        let report = ComponentsReport {
            output: "pc".into(),
            singular_values: vec![3.0, 4.0],
            files: 3,
        };
        let mut buf = Vec::new();
        report.describe_into(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("C0: sigma = 3.000000, energy = 36.00%"));
        assert!(text.contains("C1: sigma = 4.000000, energy = 64.00%"));
    }
}
