// Parser for `go test -bench` output
//
// Accepts the raw, interleaved output that accumulates in a suite's log:
// benchmark result lines, `pkg:`/`goos:` context lines, PASS/ok trailers and
// arbitrary program noise. Only result lines contribute samples.
//
//   pkg: github.com/org/repo/pkg/kv
//   BenchmarkScan/rows=10-8    100000    1234 ns/op    512 B/op    7 allocs/op

use std::collections::HashMap;

const BENCHMARK_PREFIX: &str = "Benchmark";

/// Identity of one benchmark within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BenchKey {
    /// Package from the most recent `pkg:` line, empty if none was seen
    pub package: String,
    /// Benchmark name without the `Benchmark` prefix, GOMAXPROCS suffix kept
    pub name: String,
}

/// Every sample of every metric seen in one log
#[derive(Debug, Default, Clone)]
pub struct BenchSamples {
    metrics: Vec<String>,
    values: HashMap<(String, BenchKey), Vec<f64>>,
}

impl BenchSamples {
    /// Metrics in order of first appearance
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn get(&self, metric: &str, key: &BenchKey) -> Option<&[f64]> {
        self.values
            .get(&(metric.to_string(), key.clone()))
            .map(Vec::as_slice)
    }

    /// Benchmarks that reported `metric`, sorted by package then name
    pub fn keys(&self, metric: &str) -> Vec<&BenchKey> {
        let mut keys: Vec<&BenchKey> = self
            .values
            .keys()
            .filter(|(m, _)| m == metric)
            .map(|(_, k)| k)
            .collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn push(&mut self, metric: String, key: BenchKey, value: f64) {
        if !self.metrics.contains(&metric) {
            self.metrics.push(metric.clone());
        }
        self.values.entry((metric, key)).or_default().push(value);
    }
}

/// Metric name reported for a unit; unknown units name their own metric
pub fn metric_for_unit(unit: &str) -> &str {
    match unit {
        "ns/op" => "time/op",
        "B/op" => "alloc/op",
        "allocs/op" => "allocs/op",
        "MB/s" => "speed",
        other => other,
    }
}

/// Whether larger values of `metric` are improvements
pub fn higher_is_better(metric: &str) -> bool {
    metric == "speed"
}

/// Parse a complete log
pub fn parse_bench_output(text: &str) -> BenchSamples {
    let mut samples = BenchSamples::default();
    let mut package = String::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("pkg:") {
            package = rest.trim().to_string();
            continue;
        }
        if let Some((name, measurements)) = parse_result_line(line) {
            let key = BenchKey {
                package: package.clone(),
                name,
            };
            for (value, unit) in measurements {
                samples.push(metric_for_unit(unit).to_string(), key.clone(), value);
            }
        }
    }

    samples
}

/// `BenchmarkX-8  N  v unit  v unit ...` → (`X-8`, [(v, unit), ...])
fn parse_result_line(line: &str) -> Option<(String, Vec<(f64, &str)>)> {
    let mut fields = line.split_whitespace();
    let full_name = fields.next()?;
    let name = full_name.strip_prefix(BENCHMARK_PREFIX)?;
    // `Benchmarking...` and friends are prose, not results.
    if name.starts_with(|c: char| c.is_lowercase()) {
        return None;
    }

    fields.next()?.parse::<u64>().ok()?;

    let rest: Vec<&str> = fields.collect();
    let measurements: Vec<(f64, &str)> = rest
        .chunks_exact(2)
        .map_while(|pair| pair[0].parse::<f64>().ok().map(|v| (v, pair[1])))
        .collect();
    if measurements.is_empty() {
        return None;
    }

    let name = if name.is_empty() { full_name } else { name };
    Some((name.to_string(), measurements))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
goos: linux
goarch: amd64
pkg: github.com/org/repo/pkg/kv
BenchmarkScan/rows=10-8   \t  100000\t      1234 ns/op\t     512 B/op\t       7 allocs/op
BenchmarkScan/rows=10-8   \t  100000\t      1300 ns/op\t     512 B/op\t       7 allocs/op
BenchmarkPut-8            \t   50000\t      2000 ns/op\t   45.00 MB/s
PASS
ok  \tgithub.com/org/repo/pkg/kv\t3.2s
";

    fn key(package: &str, name: &str) -> BenchKey {
        BenchKey {
            package: package.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_parses_units_into_metrics() {
        let samples = parse_bench_output(LOG);
        assert_eq!(
            samples.metrics(),
            ["time/op", "alloc/op", "allocs/op", "speed"]
        );
        let scan = key("github.com/org/repo/pkg/kv", "Scan/rows=10-8");
        assert_eq!(samples.get("time/op", &scan).unwrap(), [1234.0, 1300.0]);
        assert_eq!(samples.get("alloc/op", &scan).unwrap(), [512.0, 512.0]);
        let put = key("github.com/org/repo/pkg/kv", "Put-8");
        assert_eq!(samples.get("speed", &put).unwrap(), [45.0]);
        assert!(samples.get("alloc/op", &put).is_none());
    }

    #[test]
    fn test_keys_are_sorted() {
        let samples = parse_bench_output(LOG);
        let names: Vec<&str> = samples
            .keys("time/op")
            .iter()
            .map(|k| k.name.as_str())
            .collect();
        assert_eq!(names, ["Put-8", "Scan/rows=10-8"]);
    }

    #[test]
    fn test_package_context_switches() {
        let text = "pkg: a\nBenchmarkX 1 10 ns/op\npkg: b\nBenchmarkX 1 20 ns/op\n";
        let samples = parse_bench_output(text);
        assert_eq!(samples.get("time/op", &key("a", "X")).unwrap(), [10.0]);
        assert_eq!(samples.get("time/op", &key("b", "X")).unwrap(), [20.0]);
    }

    #[test]
    fn test_ignores_noise() {
        let text = "\
I0501 13:04:05.000 log line
Benchmarking is fun 1 2 ns/op
BenchmarkBad notanumber 10 ns/op
BenchmarkNoValues 100
--- FAIL: BenchmarkBroken
";
        assert!(parse_bench_output(text).is_empty());
    }

    #[test]
    fn test_custom_unit_is_its_own_metric() {
        let samples = parse_bench_output("BenchmarkX 10 3.5 keys/op\n");
        assert_eq!(samples.metrics(), ["keys/op"]);
    }

    #[test]
    fn test_trailing_garbage_after_pairs() {
        let samples = parse_bench_output("BenchmarkX 10 100 ns/op extra\n");
        assert_eq!(
            samples.get("time/op", &key("", "X")).unwrap(),
            [100.0]
        );
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(metric_for_unit("ns/op"), "time/op");
        assert_eq!(metric_for_unit("MB/s"), "speed");
        assert!(higher_is_better("speed"));
        assert!(!higher_is_better("time/op"));
    }
}
