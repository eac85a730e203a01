// SPDX-License-Identifier: GPL-3.0-or-later
use num_traits::Float;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// The unit of measurement string Home Assistant expects for temperatures.
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

impl Default for TemperatureUnit {
    fn default() -> Self {
        Self::Celsius
    }
}

/// A temperature value tagged with its unit.
///
/// When deserializing, a bare number is taken as Celsius. A single entry map of a unit name to a
/// number (`{ fahrenheit = 98.6 }`) can be used for other units.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(from = "MaybeTagged<T>")]
pub(crate) enum Temperature<T = f32>
where
    T: Float,
{
    Celsius(T),
    Fahrenheit(T),
}

impl<T> Temperature<T>
where
    T: Float,
{
    fn constant(value: f64) -> T {
        T::from(value).expect("small constants to be representable by any float type")
    }

    pub(crate) fn in_celsius(&self) -> T {
        match *self {
            Self::Celsius(c) => c,
            Self::Fahrenheit(f) => (f - Self::constant(32.0)) / Self::constant(1.8),
        }
    }

    pub(crate) fn in_fahrenheit(&self) -> T {
        match *self {
            Self::Celsius(c) => c * Self::constant(1.8) + Self::constant(32.0),
            Self::Fahrenheit(f) => f,
        }
    }

    pub(crate) fn as_unit(&self, unit: TemperatureUnit) -> Self {
        match unit {
            TemperatureUnit::Celsius => Self::Celsius(self.in_celsius()),
            TemperatureUnit::Fahrenheit => Self::Fahrenheit(self.in_fahrenheit()),
        }
    }

    pub(crate) fn value(&self) -> T {
        match *self {
            Temperature::Celsius(c) => c,
            Temperature::Fahrenheit(f) => f,
        }
    }

    /// Round the value (in its current unit) to the given number of decimal places.
    pub(crate) fn rounded(&self, decimals: u8) -> Self {
        let scale = Self::constant(10f64.powi(i32::from(decimals)));
        let round = |value: T| (value * scale).round() / scale;
        match *self {
            Temperature::Celsius(c) => Temperature::Celsius(round(c)),
            Temperature::Fahrenheit(f) => Temperature::Fahrenheit(round(f)),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(untagged)]
enum MaybeTagged<T>
where
    T: Float,
{
    Bare(T),
    Tagged(Tagged<T>),
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Tagged<T>
where
    T: Float,
{
    #[serde(alias = "c", alias = "C")]
    Celsius(T),

    #[serde(alias = "f", alias = "F")]
    Fahrenheit(T),
}

impl<T> From<MaybeTagged<T>> for Temperature<T>
where
    T: Float,
{
    fn from(value: MaybeTagged<T>) -> Self {
        match value {
            MaybeTagged::Bare(celsius) => Self::Celsius(celsius),
            MaybeTagged::Tagged(Tagged::Celsius(c)) => Self::Celsius(c),
            MaybeTagged::Tagged(Tagged::Fahrenheit(f)) => Self::Fahrenheit(f),
        }
    }
}
