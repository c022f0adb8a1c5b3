use std::borrow::Cow;

use super::registry::{CallSite, CallSiteId, CalleeKey, FastMap, FileRecord, SubId};
use super::{FlameKey, Report};
use crate::source::EvalSourceStore;
use crate::Result;

/// Prefix of canonical eval file keys.
pub const EVAL_PREFIX: &str = "eval:";

/// Replaces file keys, including keys embedded inside other keys, by their canonical form.
///
/// Eval file names embed the name of the file the eval ran in, e.g.
/// `(eval 12)[(eval 5)[x.pl:1]:3]`, so one key can contain another. At every
/// position the longest matching key wins, scanning left to right.
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    rules: Vec<(String, String)>,
}

impl Substitution {
    /// A substitution replacing each `from` by its `to`.
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut rules: Vec<_> = rules
            .into_iter()
            .filter(|(from, to)| !from.is_empty() && from != to)
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        rules.dedup_by(|a, b| a.0 == b.0);
        Substitution { rules }
    }

    /// Number of keys replaced.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether nothing would be replaced.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `key` with every embedded key replaced.
    pub fn apply<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if self.rules.is_empty() {
            return Cow::Borrowed(key);
        }

        let mut out = String::new();
        let mut changed = false;
        let mut copied = 0;
        let mut idx = 0;
        while idx < key.len() {
            let rest = &key[idx..];
            match self
                .rules
                .iter()
                .find(|(from, _)| rest.starts_with(from.as_str()))
            {
                Some((from, to)) => {
                    out.push_str(&key[copied..idx]);
                    out.push_str(to);
                    idx += from.len();
                    copied = idx;
                    changed = true;
                }
                None => idx += rest.chars().next().map_or(1, char::len_utf8),
            }
        }

        if changed {
            out.push_str(&key[copied..]);
            Cow::Owned(out)
        } else {
            Cow::Borrowed(key)
        }
    }

    fn apply_owned(&self, key: &mut String) {
        if let Cow::Owned(replaced) = self.apply(key) {
            *key = replaced;
        }
    }

    fn apply_sub(&self, id: &mut SubId) {
        self.apply_owned(&mut id.name);
        if let Some(ref mut file) = id.file {
            self.apply_owned(file);
        }
    }
}

impl Report {
    /// Rename the files `process_id` compiled from eval'd strings to `eval:<hash>`
    /// keys, using the content hashes from `store`.
    ///
    /// Every place a file key appears is rewritten. Evals of identical code end up
    /// under the same key and their records are merged. Returns the number of
    /// file keys that were replaced.
    pub fn canonicalize_evals<S>(&mut self, process_id: &str, store: &S) -> Result<usize>
    where
        S: EvalSourceStore + ?Sized,
    {
        self.ensure_mutable()?;

        let subst = Substitution::new(self.files.keys().filter_map(|key| {
            store
                .hash_for(process_id, key)
                .map(|hash| (key.to_string(), format!("{}{}", EVAL_PREFIX, hash)))
        }));
        if subst.is_empty() {
            return Ok(0);
        }

        let nfiles = self.files.len();
        for file in self.files.drain() {
            let key = subst.apply(&file.name).into_owned();
            let target = if key == file.name {
                self.files.get_or_create(&key, |_| file.empty_copy())
            } else {
                self.files.get_or_create(&key, FileRecord::new)
            };
            target.absorb(&file);
        }

        for mut sub in self.subs.drain() {
            subst.apply_sub(&mut sub.id);
            subst.apply_owned(&mut sub.file);

            let mut call_sites: FastMap<CallSiteId, CallSite> = FastMap::default();
            for (mut key, mut site) in sub.call_sites.drain() {
                subst.apply_owned(&mut key.file);
                subst.apply_owned(&mut site.file);
                subst.apply_sub(&mut site.caller);
                match call_sites.get_mut(&key) {
                    Some(existing) => existing.weight.absorb(&site.weight),
                    None => {
                        call_sites.insert(key, site);
                    }
                }
            }
            sub.call_sites = call_sites;

            let mut callees: FastMap<CalleeKey, u64> = FastMap::default();
            for (mut key, inclusive) in sub.callees.drain() {
                subst.apply_sub(&mut key.callee);
                *callees.entry(key).or_insert(0) += inclusive;
            }
            sub.callees = callees;

            self.subs
                .get_or_create(&sub.id, |_| sub.empty_copy())
                .absorb(&sub);
        }

        if let Some(ref mut flames) = self.flames {
            for (FlameKey(mut stack), weight) in flames.drain() {
                for id in &mut stack {
                    subst.apply_sub(id);
                }
                flames.add(FlameKey(stack), weight);
            }
        }

        info!(
            "canonicalized {} eval files of process {}: {} files now {}",
            subst.len(),
            process_id,
            nfiles,
            self.files.len()
        );
        Ok(subst.len())
    }
}
