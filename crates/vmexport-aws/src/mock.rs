//! In-memory [`AwsApi`] for tests

use crate::api::{AwsApi, CallerIdentity, Ec2Instance, ExportTarget, ExportTask};
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use vmexport_core::ByteSource;
use vmexport_core::transfer::MemorySource;

pub struct MockAws {
    instances: Vec<Ec2Instance>,
    image_size: usize,
    active_polls: AtomicU32,
    target: Mutex<Option<ExportTarget>>,
    calls: Mutex<Vec<String>>,
}

impl MockAws {
    /// One instance with a root and a data volume; the exported image is
    /// `image_size` bytes
    pub fn with_instance(instance_id: &str, name: &str, image_size: usize) -> Self {
        let instance: Ec2Instance = serde_json::from_value(serde_json::json!({
            "InstanceId": instance_id,
            "InstanceType": "t3.medium",
            "ImageId": "ami-0123",
            "State": {"Code": 16, "Name": "running"},
            "Placement": {"AvailabilityZone": "us-east-1a"},
            "PrivateIpAddress": "172.31.0.10",
            "CpuOptions": {"CoreCount": 1, "ThreadsPerCore": 2},
            "Tags": [{"Key": "Name", "Value": name}, {"Key": "env", "Value": "staging"}],
            "BlockDeviceMappings": [
                {"DeviceName": "/dev/xvda", "Ebs": {"VolumeId": "vol-root"}},
                {"DeviceName": "/dev/sdb", "Ebs": {"VolumeId": "vol-data"}}
            ],
        }))
        .expect("valid instance JSON");

        Self {
            instances: vec![instance],
            image_size,
            active_polls: AtomicU32::new(0),
            target: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Report the export task as active this many times before completion
    pub fn active_polls(self, polls: u32) -> Self {
        self.active_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn without_volumes(mut self) -> Self {
        for instance in &mut self.instances {
            instance.block_device_mappings.clear();
        }
        self
    }

    pub fn instance(&self, instance_id: &str) -> Ec2Instance {
        self.instances
            .iter()
            .find(|i| i.instance_id == instance_id)
            .cloned()
            .expect("instance registered in mock")
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AwsApi for MockAws {
    async fn caller_identity(&self) -> Result<CallerIdentity> {
        Ok(CallerIdentity {
            account: "123456789012".into(),
            arn: "arn:aws:iam::123456789012:user/exporter".into(),
            user_id: "AIDA".into(),
        })
    }

    async fn list_instances(&self) -> Result<Vec<Ec2Instance>> {
        Ok(self.instances.clone())
    }

    async fn get_instance(&self, identifier: &str) -> Result<Ec2Instance> {
        self.instances
            .iter()
            .find(|i| i.instance_id == identifier || i.name() == identifier)
            .cloned()
            .ok_or_else(|| AwsError::InstanceNotFound(identifier.to_string()))
    }

    async fn create_export_task(&self, instance_id: &str, target: &ExportTarget) -> Result<String> {
        self.record(format!("create {}", instance_id));
        *self.target.lock().unwrap() = Some(target.clone());
        Ok(format!("export-{}", instance_id))
    }

    async fn describe_export_task(&self, task_id: &str) -> Result<ExportTask> {
        self.record(format!("describe {}", task_id));
        let remaining = self.active_polls.load(Ordering::SeqCst);
        let (state, key) = if remaining > 0 {
            self.active_polls.store(remaining - 1, Ordering::SeqCst);
            ("active", None)
        } else {
            let target = self.target.lock().unwrap().clone();
            let key = target.map(|t| format!("{}{}.{}", t.prefix, task_id, t.format.as_str()));
            ("completed", key)
        };
        let message = if key.is_none() { "converting" } else { "" };
        Ok(serde_json::from_value(serde_json::json!({
            "ExportTaskId": task_id,
            "State": state,
            "StatusMessage": message,
            "ExportToS3Task": {"S3Bucket": "bkt", "S3Key": key},
        }))?)
    }

    async fn cancel_export_task(&self, task_id: &str) -> Result<()> {
        self.record(format!("cancel {}", task_id));
        Ok(())
    }

    async fn object_source(&self, bucket: &str, key: &str) -> Result<Box<dyn ByteSource>> {
        self.record(format!("open s3://{}/{}", bucket, key));
        let data: Vec<u8> = (0..self.image_size).map(|i| (i % 241) as u8).collect();
        Ok(Box::new(MemorySource::new(format!("s3://{}/{}", bucket, key), data)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.record(format!("delete s3://{}/{}", bucket, key));
        Ok(())
    }
}
