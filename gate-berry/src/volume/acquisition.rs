//! 按采集时间组织时间点.

use super::Volume4D;

/// 将 DICOM `AcquisitionDateTime` (`YYYYMMDDHHMMSS.FFFFFF`) 转换成当天的毫秒数.
///
/// 只使用第 8 个字符之后的 `HHMMSS.FFFFFF` 部分, 日期被忽略.
/// 格式不合法时返回 `None`.
pub fn acquisition_millis(date_time: &str) -> Option<f64> {
    let time = date_time.trim().get(8..)?;
    let (hms, frac) = match time.split_once('.') {
        Some((hms, frac)) => (hms, frac),
        None => (time, ""),
    };
    if hms.len() != 6 || !hms.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |r: std::ops::Range<usize>| hms[r].parse::<u32>().ok();
    let (h, m, s) = (field(0..2)?, field(2..4)?, field(4..6)?);
    if h > 23 || m > 59 || s > 59 {
        return None;
    }

    // 最多保留微秒精度.
    let frac = &frac[..frac.len().min(6)];
    let micros = if frac.is_empty() {
        0.0
    } else {
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits: f64 = frac.parse().ok()?;
        digits * 10f64.powi(6 - frac.len() as i32)
    };

    let seconds = (h * 3600 + m * 60 + s) as f64;
    Some(seconds * 1000.0 + micros / 1000.0)
}

/// 以第一个元素为基准, 计算每个时间相对它的差值.
pub fn time_differences(times: &[f64]) -> Vec<f64> {
    match times.first() {
        Some(&t0) => times.iter().map(|t| t - t0).collect(),
        None => Vec::new(),
    }
}

impl Volume4D {
    /// 将时间点标识视为 DICOM `AcquisitionDateTime`, 按采集时间升序稳定排序.
    ///
    /// 无法解析的时间点保持相对顺序, 排在所有可解析时间点之后.
    pub fn sort_by_acquisition_time(&mut self) {
        for (key, _) in self.frames.iter() {
            if acquisition_millis(key).is_none() {
                log::warn!("时间点 `{key}` 不是合法的采集时间, 将排在末尾");
            }
        }
        self.frames.sort_by(|(a, _), (b, _)| {
            match (acquisition_millis(a), acquisition_millis(b)) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
    }

    /// 按当前顺序返回各时间点相对第一个时间点的采集时间差 (毫秒).
    ///
    /// 任一时间点无法解析时返回 `None`.
    pub fn acquisition_offsets(&self) -> Option<Vec<f64>> {
        let times: Option<Vec<f64>> = self.keys().map(acquisition_millis).collect();
        Some(time_differences(&times?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VolumeShape;
    use float_eq::assert_float_eq;
    use ndarray::Array3;
    use rstest::rstest;

    #[rstest]
    #[case("20230515093012.500000", Some(((9 * 3600 + 30 * 60 + 12) as f64) * 1000.0 + 500.0))]
    #[case("20230515000000.000001", Some(0.001))]
    #[case("20230515000001", Some(1000.0))]
    #[case("20230515000000.25", Some(250.0))]
    #[case("20230515246000.0", None)]
    #[case("2023", None)]
    #[case("DefaultTime", None)]
    fn test_acquisition_millis(#[case] input: &str, #[case] expected: Option<f64>) {
        match (acquisition_millis(input), expected) {
            (Some(a), Some(b)) => assert_float_eq!(a, b, abs <= 1e-9),
            (a, b) => assert_eq!(a, b),
        }
    }

    #[test]
    fn test_time_differences() {
        assert!(time_differences(&[]).is_empty());
        assert_eq!(time_differences(&[5.0, 8.0, 4.0]), [0.0, 3.0, -1.0]);
    }

    #[test]
    fn test_sort_by_acquisition_time() {
        let frame = |v: f64| Array3::from_elem((1, 1, 1), v);
        let mut vol = Volume4D::new(VolumeShape::new(1, 1, 1));
        vol.push("20230515000003.0", frame(3.0)).unwrap();
        vol.push("bogus", frame(-1.0)).unwrap();
        vol.push("20230515000001.0", frame(1.0)).unwrap();
        vol.push("20230515000002.0", frame(2.0)).unwrap();

        assert!(vol.acquisition_offsets().is_none());
        vol.sort_by_acquisition_time();
        let order: Vec<f64> = vol.iter().map(|(_, v)| v[(0, 0, 0)]).collect();
        assert_eq!(order, [1.0, 2.0, 3.0, -1.0]);
    }

    #[test]
    fn test_acquisition_offsets() {
        let frame = Array3::zeros((1, 1, 1));
        let vol = Volume4D::from_frames([
            ("20230515000001.0", frame.clone()),
            ("20230515000004.5", frame),
        ])
        .unwrap();
        assert_eq!(vol.acquisition_offsets().unwrap(), [0.0, 3500.0]);
    }
}
