//! Readable buffer dumps for diagnostics

use crate::buffer::DataBuffer;
use crate::data_set::DataSetId;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferRole {
    Current,
    Previous,
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferRole::Current => f.write_str("current"),
            BufferRole::Previous => f.write_str("previous"),
        }
    }
}

/// One variable's components for one instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariableValue {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub floats: Vec<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub int32s: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstanceDump {
    pub index: usize,
    pub values: Vec<VariableValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BufferDump {
    pub data_set: DataSetId,
    pub role: BufferRole,
    pub num_instances: usize,
    pub num_instances_allocated: usize,
    pub instances: Vec<InstanceDump>,
}

impl BufferDump {
    /// Snapshot up to `count` live instances of `buffer` starting at `start`.
    pub fn capture(
        data_set: &DataSetId,
        buffer: &DataBuffer,
        role: BufferRole,
        start: usize,
        count: usize,
    ) -> Self {
        let end = start.saturating_add(count).min(buffer.num_instances());
        let layout = buffer.layout();

        let instances = (start..end)
            .map(|index| InstanceDump {
                index,
                values: layout
                    .iter()
                    .map(|(variable, var_layout)| VariableValue {
                        name: variable.name().to_string(),
                        floats: (0..var_layout.num_float_components())
                            .map(|c| buffer.float_column(var_layout.float_component_start + c).get(index))
                            .collect(),
                        int32s: (0..var_layout.num_int32_components())
                            .map(|c| buffer.int32_column(var_layout.int32_component_start + c).get(index))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            data_set: data_set.clone(),
            role,
            num_instances: buffer.num_instances(),
            num_instances_allocated: buffer.num_instances_allocated(),
            instances,
        }
    }

    /// Pretty JSON. Non-finite floats serialize as `null`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn log(&self) {
        tracing::info!(data_set = %self.data_set, role = %self.role, "buffer dump\n{self}");
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        let total = self.floats.len() + self.int32s.len();
        if total > 1 {
            f.write_str("(")?;
        }
        let floats = self.floats.iter().map(|v| format!("{v:.4}"));
        let ints = self.int32s.iter().map(|v| v.to_string());
        for (i, text) in floats.chain(ints).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&text)?;
        }
        if total > 1 {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for BufferDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== {} {} buffer: {} / {} instances ===",
            self.data_set, self.role, self.num_instances, self.num_instances_allocated
        )?;
        for instance in &self.instances {
            write!(f, "[{}]", instance.index)?;
            for value in &instance.values {
                write!(f, " {value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
