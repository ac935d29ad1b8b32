use itertools::Itertools;

/// This method should display the time in a sensible format. If it is less than a second, it should
/// only display the milliseconds and microseconds. If it is less than a minute, it should display
/// the seconds and milliseconds. If it is less than an hour, it should display the minutes and
/// seconds. If it is more than that, it displays hours and minutes.
pub fn show_duration(duration: std::time::Duration) -> String {
    let ms = duration.as_millis();
    let us = duration.as_micros();
    let s = duration.as_secs();
    let m = s / 60;
    let h = m / 60;

    if h > 0 {
        format!("{}h {}m", h, m % 60)
    } else if m > 0 {
        format!("{}m {}s", m, s % 60)
    } else if s > 0 {
        format!("{}s {}ms", s, ms % 1000)
    } else if ms > 0 {
        format!("{}ms {}us", ms, us % 1000)
    } else {
        format!("{}us", us)
    }
}

/// Helper trait which can be used to display symbols, words and outputs in log
/// messages and tables.
pub trait Show {
    /// Returns a human readable representation of `self`. For a symbol this should be
    /// something short like `coin(1)`, for a word the concatenation of its symbols.
    fn show(&self) -> String;

    /// Show a collection of the thing. The default puts the elements in brackets and
    /// the empty collection is displayed as `ε`.
    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        let mut it = iter.into_iter().peekable();
        if it.peek().is_none() {
            return "ε".to_string();
        }
        format!("[{}]", it.map(|x| x.show()).join(", "))
    }
}

impl<S: Show> Show for [S] {
    fn show(&self) -> String {
        S::show_collection(self.iter())
    }
}

impl<S: Show> Show for Vec<S> {
    fn show(&self) -> String {
        S::show_collection(self.iter())
    }
}

impl<S: Show + ?Sized> Show for &S {
    fn show(&self) -> String {
        S::show(*self)
    }
}

impl Show for char {
    fn show(&self) -> String {
        self.to_string()
    }

    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        let out: String = iter.into_iter().collect();
        if out.is_empty() {
            "ε".to_string()
        } else {
            out
        }
    }
}

macro_rules! impl_show_for_display {
    ($($t:ty),*) => {
        $(
            impl Show for $t {
                fn show(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_show_for_display!(u8, u16, u32, u64, usize, i32, i64, bool, String, str);

#[cfg(test)]
mod tests {
    use super::Show;

    #[test]
    fn show_words() {
        assert_eq!(vec!['a', 'b', 'a'].show(), "aba");
        assert_eq!(Vec::<char>::new().show(), "ε");
        assert_eq!(vec![1u32, 2].show(), "[1, 2]");
        assert_eq!(Vec::<u32>::new().show(), "ε");
    }

    #[test]
    fn durations() {
        use std::time::Duration;
        assert_eq!(super::show_duration(Duration::from_micros(12)), "12us");
        assert_eq!(super::show_duration(Duration::from_micros(3_012)), "3ms 12us");
        assert_eq!(super::show_duration(Duration::from_millis(61_000)), "1m 1s");
    }
}
