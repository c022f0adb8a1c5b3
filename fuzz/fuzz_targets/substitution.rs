#![no_main]

use libfuzzer_sys::fuzz_target;
use tallyprof::report::Substitution;

// The first line is the key to rewrite, every further pair of lines a rule.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let mut lines = s.lines();
        let key = lines.next().unwrap_or("");
        let rules: Vec<_> = lines.collect();
        let subst = Substitution::new(
            rules
                .chunks(2)
                .filter(|rule| rule.len() == 2)
                .map(|rule| (rule[0].to_string(), rule[1].to_string())),
        );
        subst.apply(key);
    }
});
